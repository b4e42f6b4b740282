// Model adapters and capture openers shared by the monitor and the upload endpoint

use pawsense_eye::{DogDetector, EmotionModel, FrameSource, VisionError};
use std::path::Path;
use std::sync::Arc;

/// Opens the live camera
pub type CameraOpener = Arc<dyn Fn() -> Result<Box<dyn FrameSource>, VisionError> + Send + Sync>;
/// Opens an uploaded video file
pub type VideoOpener = Arc<dyn Fn(&Path) -> Result<Box<dyn FrameSource>, VisionError> + Send + Sync>;

#[derive(Clone)]
pub struct VisionModels {
    pub detector: Arc<dyn DogDetector>,
    pub classifier: Arc<dyn EmotionModel>,
}

/// Whatever part of the vision stack could be loaded. Missing parts put the
/// corresponding features in disabled mode.
#[derive(Clone, Default)]
pub struct VisionBackend {
    pub models: Option<VisionModels>,
    pub camera: Option<CameraOpener>,
    pub video: Option<VideoOpener>,
}

impl VisionBackend {
    pub fn models(&self) -> Result<&VisionModels, VisionError> {
        self.models
            .as_ref()
            .ok_or_else(|| VisionError::Unavailable("emotion models are not loaded".to_string()))
    }

    pub fn open_video(&self, path: &Path) -> Result<Box<dyn FrameSource>, VisionError> {
        let opener = self
            .video
            .as_ref()
            .ok_or_else(|| VisionError::Unavailable("video decoding is not available in this build".to_string()))?;
        opener(path)
    }

    pub fn describe(&self) -> VisionStatus {
        VisionStatus {
            models_loaded: self.models.is_some(),
            camera_available: self.camera.is_some(),
            video_available: self.video.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct VisionStatus {
    pub models_loaded: bool,
    pub camera_available: bool,
    pub video_available: bool,
}

/// Load the ONNX models and wire the OpenCV capture sources. Model load
/// failures are logged and leave the backend without models.
#[cfg(feature = "vision")]
pub fn load(config: &pawsense_core::PawsenseConfig) -> VisionBackend {
    use pawsense_eye::models::{OnnxEmotionClassifier, YoloDogDetector};
    use pawsense_eye::{find_available_camera, CameraManager, VideoFileSource};
    use tracing::{info, warn};

    let detector = YoloDogDetector::from_config(&config.models);
    let classifier = OnnxEmotionClassifier::from_config(&config.models);
    let models = match (detector, classifier) {
        (Ok(detector), Ok(classifier)) => {
            info!("✅ Dog detector and emotion classifier loaded");
            Some(VisionModels {
                detector: Arc::new(detector),
                classifier: Arc::new(classifier),
            })
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!("⚠️  Vision models unavailable: {}", e);
            None
        }
    };

    let camera_config = config.camera.clone();
    let camera: CameraOpener = Arc::new(move || {
        let mut cfg = camera_config.clone();
        let manager = CameraManager::new(cfg.clone());
        if manager.initialize().is_ok() {
            return Ok(Box::new(manager) as Box<dyn FrameSource>);
        }
        let index = find_available_camera()
            .ok_or_else(|| VisionError::Camera("no working camera found".to_string()))?;
        cfg.index = index;
        let manager = CameraManager::new(cfg);
        manager.initialize()?;
        Ok(Box::new(manager) as Box<dyn FrameSource>)
    });
    let video: VideoOpener =
        Arc::new(|path: &Path| Ok(Box::new(VideoFileSource::open(path)?) as Box<dyn FrameSource>));

    VisionBackend {
        models,
        camera: Some(camera),
        video: Some(video),
    }
}

#[cfg(not(feature = "vision"))]
pub fn load(_config: &pawsense_core::PawsenseConfig) -> VisionBackend {
    tracing::warn!("⚠️  Built without the `vision` feature: analysis and camera monitoring are disabled");
    VisionBackend::default()
}
