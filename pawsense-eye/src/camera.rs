//! USB webcam capture and management

use crate::error::VisionError;
use crate::frame::Frame;
use crate::source::FrameSource;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};
use pawsense_core::CameraConfig;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

/// Indices scanned by [`find_available_camera`]
pub const SCAN_LIMIT: u32 = 10;

/// Camera manager for USB webcam capture
pub struct CameraManager {
    config: CameraConfig,
    capture: Arc<RwLock<Option<VideoCapture>>>,
}

impl CameraManager {
    /// Create a new camera manager
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            capture: Arc::new(RwLock::new(None)),
        }
    }

    /// Open the device and apply resolution / frame rate
    pub fn initialize(&self) -> Result<(), VisionError> {
        if self.capture.read().is_some() {
            return Ok(());
        }

        let index = self.config.index;
        let mut capture = VideoCapture::new(index as i32, CAP_ANY)
            .map_err(|e| VisionError::Camera(format!("Failed to open camera {}: {}", index, e)))?;

        if !capture
            .is_opened()
            .map_err(|e| VisionError::Camera(format!("Camera {} not opened: {}", index, e)))?
        {
            return Err(VisionError::Camera(format!("Camera {} failed to open", index)));
        }

        if self.config.width == 0 || self.config.height == 0 || self.config.fps == 0 {
            return Err(VisionError::Camera("Invalid camera resolution or frame rate".to_string()));
        }

        capture
            .set(CAP_PROP_FRAME_WIDTH, self.config.width as f64)
            .map_err(|e| VisionError::Camera(format!("Failed to set width: {}", e)))?;
        capture
            .set(CAP_PROP_FRAME_HEIGHT, self.config.height as f64)
            .map_err(|e| VisionError::Camera(format!("Failed to set height: {}", e)))?;
        capture
            .set(CAP_PROP_FPS, self.config.fps as f64)
            .map_err(|e| VisionError::Camera(format!("Failed to set FPS: {}", e)))?;

        *self.capture.write() = Some(capture);
        info!(
            "Camera {} initialized at {}x{} @ {}fps",
            index, self.config.width, self.config.height, self.config.fps
        );
        Ok(())
    }

    /// Capture a single frame
    pub fn capture_frame(&self) -> Result<Frame, VisionError> {
        let mut guard = self.capture.write();
        let capture = guard
            .as_mut()
            .ok_or_else(|| VisionError::Camera("Camera not initialized".to_string()))?;

        let mut mat = Mat::default();
        let grabbed = capture
            .read(&mut mat)
            .map_err(|e| VisionError::Camera(format!("Failed to read frame: {}", e)))?;
        if !grabbed || mat.empty() {
            return Err(VisionError::Camera("Camera returned an empty frame".to_string()));
        }
        Frame::from_mat(&mat)
    }

    /// Release the device
    pub fn stop(&self) {
        if self.capture.write().take().is_some() {
            info!("Camera {} stopped", self.config.index);
        }
    }

    pub fn is_running(&self) -> bool {
        self.capture.read().is_some()
    }
}

impl FrameSource for CameraManager {
    /// One read attempt. A failed read releases the device so the next call
    /// reopens it; pacing retries is up to the caller.
    fn read_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        self.initialize()?;
        match self.capture_frame() {
            Ok(frame) => Ok(Some(frame)),
            Err(e) => {
                warn!("Camera {} read error: {}", self.config.index, e);
                self.stop();
                Err(e)
            }
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        Some(self.config.fps as f64)
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// First camera index in `0..SCAN_LIMIT` that opens and delivers a frame
pub fn find_available_camera() -> Option<u32> {
    for index in 0..SCAN_LIMIT {
        let Ok(mut capture) = VideoCapture::new(index as i32, CAP_ANY) else {
            continue;
        };
        if !capture.is_opened().unwrap_or(false) {
            continue;
        }
        let mut mat = Mat::default();
        if capture.read(&mut mat).unwrap_or(false) && !mat.empty() {
            info!("Found working camera at index {}", index);
            return Some(index);
        }
    }
    warn!("No working camera found in indices 0..{}", SCAN_LIMIT);
    None
}
