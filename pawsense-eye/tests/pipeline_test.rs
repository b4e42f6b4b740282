//! Tests for the frame pipeline with mocked model adapters

use mockall::mock;
use pawsense_core::{BoundingBox, Detection, EmotionLabel};
use pawsense_eye::models::classify_scores;
use pawsense_eye::{
    Classification, DogDetector, EmotionModel, Frame, FramePipeline, PipelineConfig, VisionError,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

mock! {
    pub Detector {}
    impl DogDetector for Detector {
        fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;
    }
}

mock! {
    pub Classifier {}
    impl EmotionModel for Classifier {
        fn classify(&self, frame: &Frame) -> Result<Classification, VisionError>;
    }
}

fn dog() -> Detection {
    Detection {
        bbox: BoundingBox::new(2.0, 2.0, 4.0, 4.0),
        confidence: 0.8,
    }
}

fn sad() -> Classification {
    classify_scores(&[0.05, 0.05, 0.1, 0.8]).unwrap()
}

fn frame() -> Frame {
    Frame::filled(16, 16, [40, 80, 120]).unwrap()
}

fn config(interval_ms: u64, frame_skip: u32) -> PipelineConfig {
    PipelineConfig {
        analysis_interval: Duration::from_millis(interval_ms),
        frame_skip,
        crop_to_dog: false,
    }
}

#[test]
fn test_no_dog_skips_classifier() {
    let mut detector = MockDetector::new();
    detector.expect_detect().times(1).returning(|_| Ok(vec![]));
    let mut classifier = MockClassifier::new();
    classifier.expect_classify().never();

    let mut pipeline = FramePipeline::new(Arc::new(detector), Arc::new(classifier), config(0, 1));
    let outcome = pipeline.process(&frame()).unwrap();
    assert!(!outcome.dog_present());
    assert!(outcome.classification.is_none());
}

#[test]
fn test_dog_is_classified() {
    let mut detector = MockDetector::new();
    detector.expect_detect().returning(|_| Ok(vec![dog()]));
    let mut classifier = MockClassifier::new();
    classifier.expect_classify().times(1).returning(|_| Ok(sad()));

    let mut pipeline = FramePipeline::new(Arc::new(detector), Arc::new(classifier), config(0, 1));
    let outcome = pipeline.process(&frame()).unwrap();
    assert!(outcome.dog_present());
    let classification = outcome.classification.unwrap();
    assert_eq!(classification.label, EmotionLabel::Sad);
}

#[test]
fn test_frame_skip_reuses_detections() {
    let mut detector = MockDetector::new();
    // frames 0, 2 and 4 out of five
    detector.expect_detect().times(3).returning(|_| Ok(vec![dog()]));
    let mut classifier = MockClassifier::new();
    classifier.expect_classify().returning(|_| Ok(sad()));

    let mut pipeline = FramePipeline::new(Arc::new(detector), Arc::new(classifier), config(0, 2));
    let ran: Vec<bool> = (0..5)
        .map(|_| pipeline.process(&frame()).unwrap().detector_ran)
        .collect();
    assert_eq!(ran, vec![true, false, true, false, true]);
}

#[test]
fn test_analysis_interval_throttles_classifier() {
    let mut detector = MockDetector::new();
    detector.expect_detect().returning(|_| Ok(vec![dog()]));
    let mut classifier = MockClassifier::new();
    classifier.expect_classify().times(2).returning(|_| Ok(sad()));

    let mut pipeline = FramePipeline::new(Arc::new(detector), Arc::new(classifier), config(2000, 1));
    let t0 = Instant::now();
    assert!(pipeline.process_at(&frame(), t0).unwrap().classification.is_some());
    assert!(pipeline
        .process_at(&frame(), t0 + Duration::from_millis(1999))
        .unwrap()
        .classification
        .is_none());
    assert!(pipeline
        .process_at(&frame(), t0 + Duration::from_millis(2000))
        .unwrap()
        .classification
        .is_some());
}

#[test]
fn test_crop_to_dog_passes_region() {
    let mut detector = MockDetector::new();
    detector.expect_detect().returning(|_| Ok(vec![dog()]));
    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify()
        .withf(|f: &Frame| f.width() == 4 && f.height() == 4)
        .times(1)
        .returning(|_| Ok(sad()));

    let mut cfg = config(0, 1);
    cfg.crop_to_dog = true;
    let mut pipeline = FramePipeline::new(Arc::new(detector), Arc::new(classifier), cfg);
    assert!(pipeline.process(&frame()).unwrap().classification.is_some());
}

#[test]
fn test_model_error_is_returned() {
    let mut detector = MockDetector::new();
    detector
        .expect_detect()
        .returning(|_| Err(VisionError::Ort("session poisoned".to_string())));
    let classifier = MockClassifier::new();

    let mut pipeline = FramePipeline::new(Arc::new(detector), Arc::new(classifier), config(0, 1));
    assert!(matches!(pipeline.process(&frame()), Err(VisionError::Ort(_))));
}

#[test]
fn test_default_config_matches_monitor_defaults() {
    let cfg = PipelineConfig::default();
    assert_eq!(cfg.analysis_interval, Duration::from_secs(2));
    assert_eq!(cfg.frame_skip, 2);
    assert!(!cfg.crop_to_dog);
}
