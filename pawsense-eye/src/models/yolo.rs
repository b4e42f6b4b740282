//! YOLOv8 dog detector

use crate::detector::apply_nms;
#[cfg(feature = "onnx")]
use crate::detector::DogDetector;
use crate::error::VisionError;
use crate::frame::Frame;
use pawsense_core::{BoundingBox, Detection};
#[cfg(feature = "onnx")]
use pawsense_core::ModelConfig;
#[cfg(feature = "onnx")]
use parking_lot::Mutex;
#[cfg(feature = "onnx")]
use std::path::Path;
#[cfg(feature = "onnx")]
use tracing::{debug, info};

/// COCO class id of "dog"
pub const DOG_CLASS_ID: usize = 16;
pub const COCO_CLASS_COUNT: usize = 80;
/// YOLOv8 standard input size
pub const INPUT_SIZE: u32 = 640;
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Mapping between model input coordinates and frame coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Letterbox {
    /// Map a center-format box in input space back to the frame, clamped
    pub fn to_frame(&self, cx: f32, cy: f32, w: f32, h: f32) -> Option<BoundingBox> {
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) || w <= 0.0 || h <= 0.0 {
            return None;
        }
        let fw = self.frame_width as f32;
        let fh = self.frame_height as f32;
        let x0 = ((cx - w / 2.0 - self.pad_x) / self.scale).clamp(0.0, fw);
        let y0 = ((cy - h / 2.0 - self.pad_y) / self.scale).clamp(0.0, fh);
        let x1 = ((cx + w / 2.0 - self.pad_x) / self.scale).clamp(0.0, fw);
        let y1 = ((cy + h / 2.0 - self.pad_y) / self.scale).clamp(0.0, fh);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(BoundingBox::new(x0, y0, x1 - x0, y1 - y0))
    }
}

/// Aspect-preserving resize into a `size`x`size` gray canvas.
/// Returns an NCHW RGB tensor scaled to [0, 1].
pub fn letterbox(frame: &Frame, size: u32) -> Result<(Vec<f32>, Letterbox), VisionError> {
    if size == 0 {
        return Err(VisionError::Processing("Input size cannot be zero".to_string()));
    }
    let scale = (size as f32 / frame.width() as f32).min(size as f32 / frame.height() as f32);
    let new_w = ((frame.width() as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((frame.height() as f32 * scale).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = frame.resize(new_w, new_h)?;
    let plane = size as usize * size as usize;
    let mut tensor = vec![PAD_VALUE; plane * 3];
    let src = resized.data();

    for y in 0..new_h as usize {
        for x in 0..new_w as usize {
            let s = (y * new_w as usize + x) * 3;
            let d = (y + pad_y as usize) * size as usize + (x + pad_x as usize);
            // BGR -> RGB planes
            tensor[d] = src[s + 2] as f32 / 255.0;
            tensor[plane + d] = src[s + 1] as f32 / 255.0;
            tensor[2 * plane + d] = src[s] as f32 / 255.0;
        }
    }

    Ok((
        tensor,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            frame_width: frame.width(),
            frame_height: frame.height(),
        },
    ))
}

/// Decode a YOLOv8 head (`[1, 4 + classes, anchors]`, or the transposed
/// `[1, anchors, 4 + classes]`) into dog detections above `confidence_threshold`.
/// Only anchors whose best class is "dog" are kept, then NMS is applied.
pub fn decode_output(
    shape: &[i64],
    data: &[f32],
    letterbox: &Letterbox,
    confidence_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>, VisionError> {
    if shape.len() != 3 || shape[0] != 1 {
        return Err(VisionError::Model(format!("Unexpected YOLO output shape {:?}", shape)));
    }
    let attrs = 4 + COCO_CLASS_COUNT;
    let (anchors, channel_major) = if shape[1] as usize == attrs {
        (shape[2] as usize, true)
    } else if shape[2] as usize == attrs {
        (shape[1] as usize, false)
    } else {
        return Err(VisionError::Model(format!(
            "YOLO output must have {} attributes, got shape {:?}",
            attrs, shape
        )));
    };
    let expected = anchors
        .checked_mul(attrs)
        .ok_or_else(|| VisionError::Model("YOLO output size overflow".to_string()))?;
    if data.len() < expected {
        return Err(VisionError::Model(format!(
            "YOLO output has {} values, expected {}",
            data.len(),
            expected
        )));
    }

    let at = |attr: usize, anchor: usize| -> f32 {
        if channel_major {
            data[attr * anchors + anchor]
        } else {
            data[anchor * attrs + attr]
        }
    };

    let mut detections = Vec::new();
    for i in 0..anchors {
        let dog = at(4 + DOG_CLASS_ID, i);
        if !dog.is_finite() || dog < confidence_threshold {
            continue;
        }
        let dog_is_best = (0..COCO_CLASS_COUNT)
            .filter(|&c| c != DOG_CLASS_ID)
            .all(|c| at(4 + c, i) <= dog);
        if !dog_is_best {
            continue;
        }
        if let Some(bbox) = letterbox.to_frame(at(0, i), at(1, i), at(2, i), at(3, i)) {
            detections.push(Detection {
                bbox,
                confidence: dog.min(1.0),
            });
        }
    }

    Ok(apply_nms(detections, nms_threshold))
}

/// YOLOv8 ONNX model restricted to the dog class
#[cfg(feature = "onnx")]
pub struct YoloDogDetector {
    session: Mutex<ort::session::Session>,
    confidence_threshold: f32,
    nms_threshold: f32,
}

#[cfg(feature = "onnx")]
impl YoloDogDetector {
    /// Create a new detector from an ONNX export
    pub fn new(model_path: &Path, confidence_threshold: f32, nms_threshold: f32) -> Result<Self, VisionError> {
        let session = ort::session::Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?}", model_path);

        Ok(Self {
            session: Mutex::new(session),
            confidence_threshold,
            nms_threshold,
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self, VisionError> {
        Self::new(&config.detector_path, config.detector_threshold, config.nms_threshold)
    }
}

#[cfg(feature = "onnx")]
impl DogDetector for YoloDogDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError> {
        let (input, letterbox) = letterbox(frame, INPUT_SIZE)?;
        let side = INPUT_SIZE as usize;
        let array = ndarray::Array4::from_shape_vec((1, 3, side, side), input)
            .map_err(|e| VisionError::Ort(format!("Failed to create input array: {}", e)))?;
        let tensor = ort::value::Value::from_array(array)
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| VisionError::Ort("No output from YOLO model".to_string()))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;
        let shape: Vec<i64> = shape.iter().copied().collect();

        let detections = decode_output(
            &shape,
            data,
            &letterbox,
            self.confidence_threshold,
            self.nms_threshold,
        )?;
        debug!("YOLO detected {} dogs", detections.len());
        Ok(detections)
    }
}
