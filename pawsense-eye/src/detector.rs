//! Dog detection adapter

use crate::error::VisionError;
use crate::frame::Frame;
use pawsense_core::{BoundingBox, Detection};

/// Locates dogs in a frame
pub trait DogDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, VisionError>;
}

pub fn is_present(detections: &[Detection]) -> bool {
    !detections.is_empty()
}

/// Most confident detection; the larger box wins a tie
pub fn best_region(detections: &[Detection]) -> Option<BoundingBox> {
    detections
        .iter()
        .filter(|d| d.confidence.is_finite())
        .max_by(|a, b| {
            a.confidence
                .total_cmp(&b.confidence)
                .then_with(|| a.bbox.area().total_cmp(&b.bbox.area()))
        })
        .map(|d| d.bbox)
}

/// Greedy non-maximum suppression. Keeps the highest-confidence box of every
/// cluster whose pairwise IoU exceeds `iou_threshold`.
pub fn apply_nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.retain(|d| d.confidence.is_finite() && (0.0..=1.0).contains(&d.confidence));
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(detections[i]);
        for j in (i + 1)..detections.len() {
            if !suppressed[j] && detections[i].bbox.iou(&detections[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, conf: f32) -> Detection {
        Detection {
            bbox: BoundingBox::new(x, 0.0, 10.0, 10.0),
            confidence: conf,
        }
    }

    #[test]
    fn test_presence() {
        assert!(!is_present(&[]));
        assert!(is_present(&[det(0.0, 0.7)]));
    }

    #[test]
    fn test_best_region() {
        assert_eq!(best_region(&[]), None);
        let best = best_region(&[det(0.0, 0.7), det(50.0, 0.9), det(100.0, 0.8)]).unwrap();
        assert_eq!(best.x, 50.0);

        let small = det(0.0, 0.8);
        let mut large = det(20.0, 0.8);
        large.bbox.width = 30.0;
        assert_eq!(best_region(&[small, large]).unwrap().x, 20.0);
    }

    #[test]
    fn test_nms_suppresses_overlap() {
        let kept = apply_nms(vec![det(0.0, 0.7), det(1.0, 0.9), det(40.0, 0.65)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].bbox.x, 40.0);
    }

    #[test]
    fn test_nms_drops_invalid_confidence() {
        let kept = apply_nms(vec![det(0.0, f32::NAN), det(40.0, 1.5), det(80.0, 0.6)], 0.45);
        assert_eq!(kept.len(), 1);
    }
}
