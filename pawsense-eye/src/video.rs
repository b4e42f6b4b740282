//! Uploaded video decoding

use crate::error::VisionError;
use crate::frame::Frame;
use crate::source::FrameSource;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{VideoCapture, CAP_ANY, CAP_PROP_FPS, CAP_PROP_FRAME_COUNT},
};
use std::path::Path;
use tracing::{debug, info};

/// File-backed frame source
pub struct VideoFileSource {
    capture: VideoCapture,
    fps: f64,
    frame_count: u64,
}

impl VideoFileSource {
    pub fn open(path: &Path) -> Result<Self, VisionError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| VisionError::Decode(format!("Non UTF-8 path: {:?}", path)))?;
        let capture = VideoCapture::from_file(path_str, CAP_ANY)
            .map_err(|e| VisionError::Decode(format!("Failed to open video {:?}: {}", path, e)))?;
        if !capture.is_opened()? {
            return Err(VisionError::Decode(format!("Could not open video {:?}", path)));
        }

        let fps = capture.get(CAP_PROP_FPS)?;
        let frame_count = capture.get(CAP_PROP_FRAME_COUNT)?.max(0.0) as u64;
        info!("Opened video {:?}: {} frames @ {:.1} fps", path, frame_count, fps);

        Ok(Self {
            capture,
            fps,
            frame_count,
        })
    }
}

impl FrameSource for VideoFileSource {
    fn read_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        let mut mat = Mat::default();
        if !self.capture.read(&mut mat)? || mat.empty() {
            debug!("End of video stream");
            return Ok(None);
        }
        Frame::from_mat(&mat).map(Some)
    }

    fn frame_rate(&self) -> Option<f64> {
        (self.fps > 0.0).then_some(self.fps)
    }

    fn frame_count(&self) -> Option<u64> {
        (self.frame_count > 0).then_some(self.frame_count)
    }
}
