//! Four-class dog emotion classifier

use crate::error::VisionError;
use crate::frame::Frame;
use pawsense_core::EmotionLabel;
#[cfg(feature = "onnx")]
use pawsense_core::ModelConfig;
#[cfg(feature = "onnx")]
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tracing::info;

/// Classifier input side
pub const INPUT_SIZE: u32 = 224;
pub const CLASS_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: EmotionLabel,
    pub confidence: f32,
    /// Indexed like [`EmotionLabel::KNOWN`]
    pub probabilities: [f32; CLASS_COUNT],
}

impl Classification {
    /// Probabilities keyed by label name, for JSON payloads
    pub fn labelled(&self) -> Vec<(EmotionLabel, f32)> {
        EmotionLabel::KNOWN
            .iter()
            .cloned()
            .zip(self.probabilities.iter().copied())
            .collect()
    }
}

/// Maps a frame (or a dog crop) to an emotion
pub trait EmotionModel: Send + Sync {
    fn classify(&self, frame: &Frame) -> Result<Classification, VisionError>;
}

/// Resize to `size`x`size` and scale to [0, 1], NHWC, channel order as captured
pub fn preprocess(frame: &Frame, size: u32) -> Result<Vec<f32>, VisionError> {
    let resized = frame.resize(size, size)?;
    Ok(resized.data().iter().map(|&p| p as f32 / 255.0).collect())
}

/// Turn raw model scores into a classification. Scores that already form a
/// probability distribution are used as-is, anything else goes through softmax.
pub fn classify_scores(scores: &[f32]) -> Result<Classification, VisionError> {
    if scores.len() != CLASS_COUNT {
        return Err(VisionError::Model(format!(
            "Classifier returned {} scores, expected {}",
            scores.len(),
            CLASS_COUNT
        )));
    }
    if scores.iter().any(|s| !s.is_finite()) {
        return Err(VisionError::Model("Classifier returned non-finite scores".to_string()));
    }

    let sum: f32 = scores.iter().sum();
    let is_distribution = scores.iter().all(|s| (0.0..=1.0).contains(s)) && (sum - 1.0).abs() < 1e-3;

    let mut probabilities = [0.0f32; CLASS_COUNT];
    if is_distribution {
        probabilities.copy_from_slice(scores);
    } else {
        let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exp_sum: f32 = scores.iter().map(|&x| (x - max).exp()).sum();
        for (p, &x) in probabilities.iter_mut().zip(scores) {
            *p = (x - max).exp() / exp_sum;
        }
    }

    let (index, confidence) = probabilities
        .iter()
        .copied()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| VisionError::Model("No probabilities in output".to_string()))?;
    let label = EmotionLabel::from_index(index)
        .ok_or_else(|| VisionError::Model(format!("Unknown emotion index {}", index)))?;

    Ok(Classification {
        label,
        confidence,
        probabilities,
    })
}

/// ONNX export of the emotion classifier (`[1, 224, 224, 3]` in, 4 scores out)
#[cfg(feature = "onnx")]
pub struct OnnxEmotionClassifier {
    session: Mutex<ort::session::Session>,
}

#[cfg(feature = "onnx")]
impl OnnxEmotionClassifier {
    /// Create a new classifier by loading the ONNX model
    pub fn new(model_path: &Path) -> Result<Self, VisionError> {
        let session = ort::session::Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load emotion model: {}", e)))?;
        info!("Emotion model loaded from {:?}", model_path);
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, VisionError> {
        Self::new(&config.classifier_path)
    }
}

#[cfg(feature = "onnx")]
impl EmotionModel for OnnxEmotionClassifier {
    fn classify(&self, frame: &Frame) -> Result<Classification, VisionError> {
        let side = INPUT_SIZE as usize;
        let input = preprocess(frame, INPUT_SIZE)?;
        let array = ndarray::Array4::from_shape_vec((1, side, side, 3), input)
            .map_err(|e| VisionError::Ort(format!("Failed to create input array: {}", e)))?;
        let tensor = ort::value::Value::from_array(array)
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::Ort(format!("Emotion inference failed: {}", e)))?;
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| VisionError::Ort("No output from emotion model".to_string()))?;
        let (_, scores) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;

        classify_scores(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_used_as_is() {
        let c = classify_scores(&[0.1, 0.2, 0.6, 0.1]).unwrap();
        assert_eq!(c.label, EmotionLabel::Relaxed);
        assert!((c.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let c = classify_scores(&[4.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(c.label, EmotionLabel::Angry);
        let sum: f32 = c.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(c.confidence > 0.9);
    }

    #[test]
    fn test_index_order() {
        for (i, label) in EmotionLabel::KNOWN.iter().enumerate() {
            let mut scores = [0.0f32; CLASS_COUNT];
            scores[i] = 1.0;
            assert_eq!(&classify_scores(&scores).unwrap().label, label);
        }
    }

    #[test]
    fn test_bad_scores() {
        assert!(classify_scores(&[0.5, 0.5]).is_err());
        assert!(classify_scores(&[f32::NAN, 0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = Frame::filled(50, 30, [255, 0, 51]).unwrap();
        let input = preprocess(&frame, INPUT_SIZE).unwrap();
        assert_eq!(input.len(), 224 * 224 * 3);
        // NHWC, BGR kept
        assert!((input[0] - 1.0).abs() < 1e-6);
        assert!(input[1].abs() < 1e-6);
        assert!((input[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_labelled() {
        let c = classify_scores(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        let labelled = c.labelled();
        assert_eq!(labelled[3], (EmotionLabel::Sad, 0.4));
    }

    proptest::proptest! {
        #[test]
        fn prop_scores_become_a_distribution(scores in proptest::collection::vec(-20.0f32..20.0, CLASS_COUNT)) {
            let c = classify_scores(&scores).unwrap();
            let sum: f32 = c.probabilities.iter().sum();
            proptest::prop_assert!((sum - 1.0).abs() < 1e-4);
            let max = c.probabilities.iter().cloned().fold(0.0f32, f32::max);
            proptest::prop_assert_eq!(c.confidence, max);
        }
    }
}
