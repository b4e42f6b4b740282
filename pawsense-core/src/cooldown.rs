// Alert throttling keyed by emotion (optionally by confidence decile)

use crate::types::EmotionLabel;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Throttling key. `bucket` is the confidence decile (0..=10) when
/// bucketing is enabled, otherwise `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub label: EmotionLabel,
    pub bucket: Option<u8>,
}

impl CooldownKey {
    pub fn new(label: &EmotionLabel, confidence: f32, bucket_by_confidence: bool) -> Self {
        let bucket = if bucket_by_confidence {
            Some((confidence.clamp(0.0, 1.0) * 10.0).floor() as u8)
        } else {
            None
        };
        Self {
            label: label.clone(),
            bucket,
        }
    }
}

/// Instant of the last alert per key
#[derive(Debug, Clone)]
pub struct AlertCooldownState {
    window: Duration,
    last_fired: HashMap<CooldownKey, Instant>,
}

impl AlertCooldownState {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when `key` has never fired or fired at least `window` ago
    pub fn is_ready(&self, key: &CooldownKey, now: Instant) -> bool {
        match self.last_fired.get(key) {
            Some(last) => now.saturating_duration_since(*last) >= self.window,
            None => true,
        }
    }

    pub fn mark(&mut self, key: CooldownKey, now: Instant) {
        self.last_fired.insert(key, now);
    }

    /// Check and mark in one step. Returns whether the key was ready.
    pub fn try_fire(&mut self, key: CooldownKey, now: Instant) -> bool {
        if self.is_ready(&key, now) {
            self.mark(key, now);
            true
        } else {
            false
        }
    }

    pub fn last_fired(&self, key: &CooldownKey) -> Option<Instant> {
        self.last_fired.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }

    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}
