// Domain types shared by the vision pipeline, coordinator and relays

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Emotion categories produced by the classifier.
///
/// The classifier emits only the four known labels; `Unknown` exists so that
/// labels arriving from elsewhere (dashboard, replayed data) are still
/// recorded and rendered with a generic icon instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry,
    Happy,
    Relaxed,
    Sad,
    #[serde(untagged)]
    Unknown(String),
}

impl EmotionLabel {
    /// Known labels in classifier output order
    pub const KNOWN: [EmotionLabel; 4] = [
        EmotionLabel::Angry,
        EmotionLabel::Happy,
        EmotionLabel::Relaxed,
        EmotionLabel::Sad,
    ];

    /// Map a classifier output index to a label
    pub fn from_index(index: usize) -> Option<Self> {
        Self::KNOWN.get(index).cloned()
    }

    /// Index in the classifier output vector, if the label is known
    pub fn index(&self) -> Option<usize> {
        match self {
            EmotionLabel::Angry => Some(0),
            EmotionLabel::Happy => Some(1),
            EmotionLabel::Relaxed => Some(2),
            EmotionLabel::Sad => Some(3),
            EmotionLabel::Unknown(_) => None,
        }
    }

    /// Negative emotions are the ones that can raise an alert
    pub fn is_negative(&self) -> bool {
        matches!(self, EmotionLabel::Angry | EmotionLabel::Sad)
    }

    pub fn as_str(&self) -> &str {
        match self {
            EmotionLabel::Angry => "angry",
            EmotionLabel::Happy => "happy",
            EmotionLabel::Relaxed => "relaxed",
            EmotionLabel::Sad => "sad",
            EmotionLabel::Unknown(raw) => raw.as_str(),
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "😠",
            EmotionLabel::Happy => "😊",
            EmotionLabel::Relaxed => "😌",
            EmotionLabel::Sad => "😢",
            EmotionLabel::Unknown(_) => "🐕",
        }
    }

    /// Dashboard color as a CSS hex string
    pub fn color(&self) -> &'static str {
        match self {
            EmotionLabel::Angry => "#ff3b30",
            EmotionLabel::Happy => "#ffd60a",
            EmotionLabel::Relaxed => "#34c759",
            EmotionLabel::Sad => "#0a84ff",
            EmotionLabel::Unknown(_) => "#ffffff",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmotionLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Ok(match normalized.as_str() {
            "angry" => EmotionLabel::Angry,
            "happy" => EmotionLabel::Happy,
            "relaxed" => EmotionLabel::Relaxed,
            "sad" => EmotionLabel::Sad,
            _ => EmotionLabel::Unknown(normalized),
        })
    }
}

/// One successful classification
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionSample {
    pub label: EmotionLabel,
    pub confidence: f32,
    pub timestamp: Instant,
    pub recorded_at: DateTime<Utc>,
}

impl EmotionSample {
    /// Create a sample stamped with the current time
    pub fn new(label: EmotionLabel, confidence: f32) -> Self {
        Self::at(label, confidence, Instant::now())
    }

    /// Create a sample stamped with an explicit monotonic instant
    pub fn at(label: EmotionLabel, confidence: f32, timestamp: Instant) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            label,
            confidence,
            timestamp,
            recorded_at: Utc::now(),
        }
    }
}

/// Axis-aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let values = [
            self.x, self.y, self.width, self.height,
            other.x, other.y, other.width, other.height,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return 0.0;
        }
        if self.width < 0.0 || self.height < 0.0 || other.width < 0.0 || other.height < 0.0 {
            return 0.0;
        }

        let inter_x_min = self.x.max(other.x);
        let inter_y_min = self.y.max(other.y);
        let inter_x_max = (self.x + self.width).min(other.x + other.width);
        let inter_y_max = (self.y + self.height).min(other.y + other.height);

        if inter_x_max <= inter_x_min || inter_y_max <= inter_y_min {
            return 0.0;
        }

        let inter_area = (inter_x_max - inter_x_min) * (inter_y_max - inter_y_min);
        let union_area = self.area() + other.area() - inter_area;
        if union_area <= 0.0 || !union_area.is_finite() {
            return 0.0;
        }

        let iou = inter_area / union_area;
        if iou.is_finite() && (0.0..=1.0).contains(&iou) {
            iou
        } else {
            0.0
        }
    }
}

/// Dog found by the object detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}
