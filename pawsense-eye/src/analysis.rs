//! Analysis of uploaded stills and videos

use crate::detector::DogDetector;
use crate::error::VisionError;
use crate::frame::Frame;
use crate::models::EmotionModel;
use crate::overlay::annotate;
use crate::pipeline::classify_frame;
use crate::source::FrameSource;
use pawsense_core::report::{distribution_from, headline_advice, EmotionCount};
use base64::Engine;
use pawsense_core::{Detection, EmotionLabel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Analyze every n-th frame of a video
pub const DEFAULT_SAMPLE_EVERY: u64 = 10;
pub const TIMELINE_LIMIT: usize = 20;
const ANNOTATED_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub label: EmotionLabel,
    pub confidence: f32,
    pub probabilities: Vec<(EmotionLabel, f32)>,
    pub dog_count: usize,
    pub detections: Vec<Detection>,
    /// Base64 JPEG of the still with boxes and the emotion reading drawn on
    pub image: String,
}

/// Detect then classify a single still. Fails with
/// [`VisionError::NoDogDetected`] when the detector finds nothing.
pub fn analyze_image(
    detector: &dyn DogDetector,
    classifier: &dyn EmotionModel,
    frame: &Frame,
    crop_to_dog: bool,
) -> Result<ImageAnalysis, VisionError> {
    let detections = detector.detect(frame)?;
    if detections.is_empty() {
        return Err(VisionError::NoDogDetected);
    }
    let classification = classify_frame(classifier, frame, &detections, crop_to_dog)?;
    let annotated = annotate(
        frame,
        &detections,
        Some((&classification.label, classification.confidence)),
    );
    let image = base64::engine::general_purpose::STANDARD.encode(annotated.to_jpeg(ANNOTATED_JPEG_QUALITY)?);
    Ok(ImageAnalysis {
        image,
        probabilities: classification.labelled(),
        label: classification.label,
        confidence: classification.confidence,
        dog_count: detections.len(),
        detections,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub frame: u64,
    /// Seconds from the start of the video, when the frame rate is known
    pub timestamp_secs: Option<f64>,
    pub label: EmotionLabel,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoSummary {
    pub total_frames: u64,
    pub frames_analyzed: u64,
    pub frames_with_dogs: u64,
    pub dominant_emotion: Option<EmotionLabel>,
    pub distribution: Vec<EmotionCount>,
    pub average_confidence: f32,
    /// Share of analyzed frames containing a dog, in percent
    pub dog_detection_rate: f32,
    pub processing_fps: f32,
    pub duration_secs: Option<f64>,
    pub timeline: Vec<TimelineEntry>,
    /// Every classification in order, for the emotion history
    pub samples: Vec<(EmotionLabel, f32)>,
    /// Frame with the most confident classification, annotated
    #[serde(skip)]
    pub best_frame: Option<Frame>,
}

pub struct VideoAnalyzer {
    detector: Arc<dyn DogDetector>,
    classifier: Arc<dyn EmotionModel>,
    sample_every: u64,
    crop_to_dog: bool,
}

impl VideoAnalyzer {
    pub fn new(detector: Arc<dyn DogDetector>, classifier: Arc<dyn EmotionModel>) -> Self {
        Self {
            detector,
            classifier,
            sample_every: DEFAULT_SAMPLE_EVERY,
            crop_to_dog: false,
        }
    }

    pub fn with_sample_every(mut self, n: u64) -> Self {
        self.sample_every = n.max(1);
        self
    }

    pub fn with_crop_to_dog(mut self, crop: bool) -> Self {
        self.crop_to_dog = crop;
        self
    }

    /// Walk the whole source. Per-frame model errors are logged and the frame
    /// is skipped; a read error ends the walk with what was gathered so far.
    pub fn analyze(&self, source: &mut dyn FrameSource) -> Result<VideoSummary, VisionError> {
        let started = Instant::now();
        let fps = source.frame_rate();
        let mut summary = VideoSummary::default();
        let mut best_confidence = f32::MIN;
        let mut index: u64 = 0;

        loop {
            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if index == 0 => return Err(e),
                Err(e) => {
                    warn!("Stopping video analysis at frame {}: {}", index, e);
                    break;
                }
            };
            let current = index;
            index += 1;
            if current % self.sample_every != 0 {
                continue;
            }
            summary.frames_analyzed += 1;

            let detections = match self.detector.detect(&frame) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Detection failed on frame {}: {}", current, e);
                    continue;
                }
            };
            if detections.is_empty() {
                continue;
            }
            summary.frames_with_dogs += 1;

            let classification =
                match classify_frame(self.classifier.as_ref(), &frame, &detections, self.crop_to_dog) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Classification failed on frame {}: {}", current, e);
                        continue;
                    }
                };

            if summary.timeline.len() < TIMELINE_LIMIT {
                summary.timeline.push(TimelineEntry {
                    frame: current,
                    timestamp_secs: fps.filter(|f| *f > 0.0).map(|f| current as f64 / f),
                    label: classification.label.clone(),
                    confidence: classification.confidence,
                });
            }
            if classification.confidence > best_confidence {
                best_confidence = classification.confidence;
                summary.best_frame = Some(annotate(
                    &frame,
                    &detections,
                    Some((&classification.label, classification.confidence)),
                ));
            }
            summary.samples.push((classification.label, classification.confidence));
        }

        summary.total_frames = index;
        summary.duration_secs = fps.filter(|f| *f > 0.0).map(|f| index as f64 / f);
        summary.distribution = distribution_from(summary.samples.iter().map(|(l, _)| l));
        summary.dominant_emotion = summary.distribution.first().map(|d| d.label.clone());
        if !summary.samples.is_empty() {
            summary.average_confidence =
                summary.samples.iter().map(|(_, c)| *c).sum::<f32>() / summary.samples.len() as f32;
        }
        if summary.frames_analyzed > 0 {
            summary.dog_detection_rate =
                summary.frames_with_dogs as f32 * 100.0 / summary.frames_analyzed as f32;
        }
        let elapsed = started.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            summary.processing_fps = summary.frames_analyzed as f32 / elapsed;
        }

        info!(
            "Video analyzed: {} frames, {} sampled, {} with dogs",
            summary.total_frames, summary.frames_analyzed, summary.frames_with_dogs
        );
        Ok(summary)
    }
}

/// Chat rendering of a video summary
pub fn render_video_summary(summary: &VideoSummary) -> String {
    let mut text = String::from("🎬 *VIDEO ANALYSIS COMPLETE*\n\n");
    text.push_str(&format!("📊 Frames: {} total, {} analyzed\n", summary.total_frames, summary.frames_analyzed));
    if let Some(duration) = summary.duration_secs {
        text.push_str(&format!("⏱ Duration: {:.1}s\n", duration));
    }
    text.push_str(&format!(
        "🐕 Dog visible in {} analyzed frames ({:.1}%)\n",
        summary.frames_with_dogs, summary.dog_detection_rate
    ));

    let Some(dominant) = &summary.dominant_emotion else {
        text.push_str("\nNo dog emotions could be determined in this video.");
        return text;
    };

    text.push_str(&format!(
        "\n{} Dominant emotion: *{}*\n🎚 Average confidence: {:.1}%\n\n*Distribution:*\n",
        dominant.emoji(),
        dominant.as_str().to_uppercase(),
        summary.average_confidence * 100.0
    ));
    for entry in &summary.distribution {
        text.push_str(&format!(
            "{} {}: {} ({:.1}%)\n",
            entry.label.emoji(),
            entry.label,
            entry.count,
            entry.percentage
        ));
    }
    text.push_str("\n💡 *Recommendation:*\n");
    text.push_str(headline_advice(dominant));
    text
}
