//! Shared fixtures: colour-coded stub models and an in-memory camera

#![allow(dead_code)]

use async_trait::async_trait;
use pawsense_core::{BoundingBox, Detection, PawsenseConfig};
use pawsense_eye::models::classify_scores;
use pawsense_eye::{Classification, DogDetector, EmotionModel, Frame, FrameSequence, FrameSource, VisionError};
use pawsense_server::vision::{CameraOpener, VideoOpener};
use pawsense_server::{
    AppContext, DispatchHandle, Notifier, NotifyError, ParseMode, ServiceMetrics, VisionBackend,
    VisionModels,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A dog is present when the blue channel is bright
pub struct BlueDogDetector;

impl DogDetector for BlueDogDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        match frame.pixel(0, 0) {
            Some([b, _, _]) if b > 100 => Ok(vec![Detection {
                bbox: BoundingBox::new(0.0, 0.0, frame.width() as f32, frame.height() as f32),
                confidence: 0.9,
            }]),
            _ => Ok(vec![]),
        }
    }
}

/// Bright red reads as sad, anything else as happy
pub struct RedMoodClassifier;

impl EmotionModel for RedMoodClassifier {
    fn classify(&self, frame: &Frame) -> Result<Classification, VisionError> {
        let [_, _, r] = frame
            .pixel(0, 0)
            .ok_or_else(|| VisionError::Processing("empty frame".to_string()))?;
        if r > 128 {
            classify_scores(&[0.1, 0.1, 0.1, 0.7])
        } else {
            classify_scores(&[0.1, 0.7, 0.1, 0.1])
        }
    }
}

pub fn sad_dog() -> Frame {
    Frame::filled(32, 32, [200, 30, 220]).unwrap()
}

pub fn happy_dog() -> Frame {
    Frame::filled(32, 32, [200, 30, 20]).unwrap()
}

pub fn empty_room() -> Frame {
    Frame::filled(32, 32, [10, 10, 10]).unwrap()
}

/// Classify every frame, push at the fastest allowed rate
pub fn fast_config() -> PawsenseConfig {
    let mut config = PawsenseConfig::default();
    config.monitor.analysis_interval_secs = 0;
    config.models.frame_skip = 1;
    config.server.frame_rate = 60;
    config.logging.directory = None;
    config
}

pub fn stub_backend(camera_frames: Vec<Frame>) -> VisionBackend {
    let camera: CameraOpener = Arc::new(move || {
        Ok(Box::new(FrameSequence::new(camera_frames.clone())) as Box<dyn FrameSource>)
    });
    let video: VideoOpener = Arc::new(|_path: &Path| {
        let frames: Vec<Frame> = (0..25).map(|_| sad_dog()).collect();
        Ok(Box::new(FrameSequence::new(frames).with_frame_rate(10.0)) as Box<dyn FrameSource>)
    });
    VisionBackend {
        models: Some(VisionModels {
            detector: Arc::new(BlueDogDetector),
            classifier: Arc::new(RedMoodClassifier),
        }),
        camera: Some(camera),
        video: Some(video),
    }
}

pub fn test_context(config: PawsenseConfig, backend: VisionBackend, alerts: DispatchHandle) -> AppContext {
    AppContext::new(
        config,
        backend,
        alerts,
        Arc::new(ServiceMetrics::new()),
        CancellationToken::new(),
    )
}

/// Notifier that records what it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, text: &str, _mode: ParseMode) -> Result<(), NotifyError> {
        self.sent.lock().push(format!("text:{}", text));
        Ok(())
    }

    async fn send_image(&self, path: &Path, caption: &str) -> Result<(), NotifyError> {
        let bytes = tokio::fs::read(path).await?;
        self.sent.lock().push(format!("image:{}:{}", bytes.len(), caption));
        Ok(())
    }

    async fn send_video(&self, path: &Path, caption: &str) -> Result<(), NotifyError> {
        self.sent.lock().push(format!("video:{}:{}", path.display(), caption));
        Ok(())
    }
}
