//! Model adapters

pub mod classifier;
pub mod store;
pub mod yolo;

pub use classifier::{classify_scores, Classification, EmotionModel};
#[cfg(feature = "onnx")]
pub use classifier::OnnxEmotionClassifier;
#[cfg(feature = "onnx")]
pub use yolo::YoloDogDetector;
