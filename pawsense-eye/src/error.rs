//! Error types for pawsense-eye

use thiserror::Error;
use pawsense_core::Error as CoreError;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ONNX Runtime error: {0}")]
    Ort(String),

    #[error("OpenCV error: {0}")]
    OpenCv(String),

    /// Built without the cargo feature the operation needs, or the model is not loaded
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("No dog detected")]
    NoDogDetected,
}

impl VisionError {
    /// Capture errors are retried by the monitor loop; everything else drops the frame
    pub fn is_transient(&self) -> bool {
        matches!(self, VisionError::Camera(_) | VisionError::OpenCv(_))
    }
}

impl From<VisionError> for CoreError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::Io(e) => CoreError::Io(e),
            other => CoreError::Configuration(format!("Vision error: {}", other)),
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Camera("Test error".to_string());
        assert!(err.to_string().contains("Camera error"));
        assert!(err.to_string().contains("Test error"));
        assert_eq!(VisionError::NoDogDetected.to_string(), "No dog detected");
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let vision_err: VisionError = io_err.into();
        match vision_err {
            VisionError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_vision_error_to_core_error() {
        let core_err: CoreError = VisionError::Model("bad graph".to_string()).into();
        match core_err {
            CoreError::Configuration(msg) => {
                assert!(msg.contains("Vision error"));
                assert!(msg.contains("bad graph"));
            }
            _ => panic!("Expected Configuration error"),
        }
    }

    #[test]
    fn test_transient_errors() {
        assert!(VisionError::Camera("lost".to_string()).is_transient());
        assert!(!VisionError::Model("bad".to_string()).is_transient());
        assert!(!VisionError::NoDogDetected.is_transient());
    }
}
