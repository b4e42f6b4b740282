//! Capture source abstraction

use crate::error::VisionError;
use crate::frame::Frame;
use std::collections::VecDeque;

/// Something that yields frames until the end of the stream
pub trait FrameSource: Send {
    /// `Ok(None)` marks the end of the stream
    fn read_frame(&mut self) -> Result<Option<Frame>, VisionError>;

    /// Nominal frames per second, if the source knows it
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    /// Total frames, for finite sources
    fn frame_count(&self) -> Option<u64> {
        None
    }
}

/// In-memory finite source
#[derive(Debug, Default)]
pub struct FrameSequence {
    frames: VecDeque<Frame>,
    total: u64,
    fps: Option<f64>,
}

impl FrameSequence {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            total: frames.len() as u64,
            frames: frames.into(),
            fps: None,
        }
    }

    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }
}

impl FrameSource for FrameSequence {
    fn read_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        Ok(self.frames.pop_front())
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_ends() {
        let frame = Frame::filled(2, 2, [0, 0, 0]).unwrap();
        let mut source = FrameSequence::new(vec![frame.clone(), frame]).with_frame_rate(25.0);
        assert_eq!(source.frame_count(), Some(2));
        assert_eq!(source.frame_rate(), Some(25.0));
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());
    }
}
