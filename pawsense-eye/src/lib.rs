//! pawsense-eye: vision adapters for PawSense
//!
//! Capture sources, the YOLOv8 dog detector, the four-class emotion
//! classifier and the pipeline that chains them. ONNX inference sits behind
//! the `onnx` feature and camera / video I/O behind the `opencv` feature;
//! everything else (pre- and post-processing, analysis bookkeeping) is always
//! built so that it can be exercised with stub adapters.

pub mod analysis;
pub mod detector;
pub mod error;
pub mod frame;
pub mod models;
pub mod overlay;
pub mod pipeline;
pub mod source;
#[cfg(feature = "opencv")]
pub mod camera;
#[cfg(feature = "opencv")]
pub mod video;

pub use analysis::{analyze_image, render_video_summary, ImageAnalysis, VideoAnalyzer, VideoSummary};
pub use detector::{best_region, is_present, DogDetector};
pub use error::VisionError;
pub use frame::Frame;
pub use models::{Classification, EmotionModel};
pub use overlay::annotate;
pub use pipeline::{FrameOutcome, FramePipeline, PipelineConfig};
pub use source::{FrameSequence, FrameSource};
#[cfg(feature = "opencv")]
pub use camera::{find_available_camera, CameraManager};
#[cfg(feature = "opencv")]
pub use video::VideoFileSource;
