//! Per-frame detection → classification pipeline

use crate::detector::{best_region, is_present, DogDetector};
use crate::error::VisionError;
use crate::frame::Frame;
use crate::models::{Classification, EmotionModel};
use pawsense_core::{Detection, ModelConfig, MonitorConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Minimum time between two classifications
    pub analysis_interval: Duration,
    /// Run the detector on every n-th frame
    pub frame_skip: u32,
    pub crop_to_dog: bool,
}

impl PipelineConfig {
    pub fn from_config(models: &ModelConfig, monitor: &MonitorConfig) -> Self {
        Self {
            analysis_interval: monitor.analysis_interval(),
            frame_skip: models.frame_skip.max(1),
            crop_to_dog: models.crop_to_dog,
        }
    }

    /// Detect and classify every frame handed in
    pub fn every_frame(crop_to_dog: bool) -> Self {
        Self {
            analysis_interval: Duration::ZERO,
            frame_skip: 1,
            crop_to_dog,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&ModelConfig::default(), &MonitorConfig::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    pub detections: Vec<Detection>,
    /// Present only when a dog was found and the analysis interval elapsed
    pub classification: Option<Classification>,
    /// False when cached detections from an earlier frame were reused
    pub detector_ran: bool,
}

impl FrameOutcome {
    pub fn dog_present(&self) -> bool {
        is_present(&self.detections)
    }
}

/// Classify the best dog region of `frame` (or the whole frame)
pub fn classify_frame(
    classifier: &dyn EmotionModel,
    frame: &Frame,
    detections: &[Detection],
    crop_to_dog: bool,
) -> Result<Classification, VisionError> {
    if crop_to_dog {
        if let Some(region) = best_region(detections) {
            if let Some(crop) = frame.crop(&region)? {
                return classifier.classify(&crop);
            }
        }
    }
    classifier.classify(frame)
}

pub struct FramePipeline {
    detector: Arc<dyn DogDetector>,
    classifier: Arc<dyn EmotionModel>,
    config: PipelineConfig,
    frame_index: u64,
    cached: Vec<Detection>,
    last_analysis: Option<Instant>,
}

impl FramePipeline {
    /// Create a new pipeline over shared model adapters
    pub fn new(
        detector: Arc<dyn DogDetector>,
        classifier: Arc<dyn EmotionModel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            detector,
            classifier,
            config,
            frame_index: 0,
            cached: Vec::new(),
            last_analysis: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process(&mut self, frame: &Frame) -> Result<FrameOutcome, VisionError> {
        self.process_at(frame, Instant::now())
    }

    /// Adapter errors are returned as-is; the cached detections survive them
    pub fn process_at(&mut self, frame: &Frame, now: Instant) -> Result<FrameOutcome, VisionError> {
        let skip = self.config.frame_skip.max(1) as u64;
        let detector_ran = self.frame_index % skip == 0;
        self.frame_index += 1;

        if detector_ran {
            self.cached = self.detector.detect(frame)?;
        }

        let mut outcome = FrameOutcome {
            detections: self.cached.clone(),
            classification: None,
            detector_ran,
        };
        if !outcome.dog_present() {
            return Ok(outcome);
        }

        let due = match self.last_analysis {
            Some(last) => now.saturating_duration_since(last) >= self.config.analysis_interval,
            None => true,
        };
        if !due {
            return Ok(outcome);
        }

        let classification = classify_frame(
            self.classifier.as_ref(),
            frame,
            &outcome.detections,
            self.config.crop_to_dog,
        )?;
        debug!(
            "Classified {} ({:.2}) from {} detections",
            classification.label,
            classification.confidence,
            outcome.detections.len()
        );
        self.last_analysis = Some(now);
        outcome.classification = Some(classification);
        Ok(outcome)
    }
}
