//! Owned BGR8 frames.
//!
//! Frames keep the channel order of the capture device (BGR), which is also
//! the order the emotion classifier was trained on. Conversion to RGB only
//! happens at the edges: JPEG encoding for the dashboard and decoding of
//! uploaded stills.

use crate::error::VisionError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, RgbImage};
use pawsense_core::BoundingBox;

/// Largest frame accepted from any source (8K)
pub const MAX_DIMENSION: u32 = 7680;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a tightly packed BGR8 buffer
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, VisionError> {
        if width == 0 || height == 0 {
            return Err(VisionError::Processing("Frame dimensions cannot be zero".to_string()));
        }
        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(VisionError::Processing(format!(
                "Frame too large: {}x{} (max {})",
                width, height, MAX_DIMENSION
            )));
        }
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(VisionError::Processing(format!(
                "Frame buffer has {} bytes, expected {} for {}x{} BGR",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self { width, height, data })
    }

    /// Frame of a single BGR color
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Result<Self, VisionError> {
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(width, height, data)
    }

    /// Decode a JPEG/PNG/... still
    pub fn decode(bytes: &[u8]) -> Result<Self, VisionError> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| VisionError::Decode(format!("Unsupported or corrupt image: {}", e)))?;
        Self::from_rgb(&image.to_rgb8())
    }

    pub fn from_rgb(image: &RgbImage) -> Result<Self, VisionError> {
        let mut data = image.as_raw().clone();
        swap_red_blue(&mut data);
        Self::new(image.width(), image.height(), data)
    }

    pub fn to_rgb(&self) -> Result<RgbImage, VisionError> {
        let mut data = self.data.clone();
        swap_red_blue(&mut data);
        RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| VisionError::Processing("Failed to build RGB image".to_string()))
    }

    /// Same pixels, BGR order preserved, packed in an `RgbImage` container for resizing
    fn as_buffer(&self) -> Result<RgbImage, VisionError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| VisionError::Processing("Failed to wrap frame buffer".to_string()))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// BGR value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Paint the half-open rectangle `[x0, x1) x [y0, y1)`, clipped to the frame
    pub fn fill_rect(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, bgr: [u8; 3]) {
        let x0 = x0.clamp(0, self.width as i64) as usize;
        let x1 = x1.clamp(0, self.width as i64) as usize;
        let y0 = y0.clamp(0, self.height as i64) as usize;
        let y1 = y1.clamp(0, self.height as i64) as usize;
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let stride = self.width as usize * 3;
        for row in self.data[y0 * stride..y1 * stride].chunks_exact_mut(stride) {
            for px in row[x0 * 3..x1 * 3].chunks_exact_mut(3) {
                px.copy_from_slice(&bgr);
            }
        }
    }

    /// Stretch to `width`x`height` (bilinear), channel order unchanged
    pub fn resize(&self, width: u32, height: u32) -> Result<Frame, VisionError> {
        if width == 0 || height == 0 {
            return Err(VisionError::Processing("Target dimensions cannot be zero".to_string()));
        }
        let resized = imageops::resize(&self.as_buffer()?, width, height, FilterType::Triangle);
        Frame::new(width, height, resized.into_raw())
    }

    /// Sub-image covered by `bbox`, clamped to the frame. `None` if the
    /// intersection is empty.
    pub fn crop(&self, bbox: &BoundingBox) -> Result<Option<Frame>, VisionError> {
        if ![bbox.x, bbox.y, bbox.width, bbox.height].iter().all(|v| v.is_finite()) {
            return Ok(None);
        }
        let x0 = bbox.x.max(0.0).floor() as u32;
        let y0 = bbox.y.max(0.0).floor() as u32;
        let x1 = ((bbox.x + bbox.width).ceil().max(0.0) as u32).min(self.width);
        let y1 = ((bbox.y + bbox.height).ceil().max(0.0) as u32).min(self.height);
        if x1 <= x0 || y1 <= y0 {
            return Ok(None);
        }
        let cropped = imageops::crop_imm(&self.as_buffer()?, x0, y0, x1 - x0, y1 - y0).to_image();
        Frame::new(cropped.width(), cropped.height(), cropped.into_raw()).map(Some)
    }

    /// Encode as JPEG (RGB) for the dashboard and chat snapshots
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, VisionError> {
        let rgb = self.to_rgb()?;
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
            rgb.as_raw(),
            self.width,
            self.height,
            ColorType::Rgb8,
        )?;
        Ok(out)
    }

    #[cfg(feature = "opencv")]
    pub fn from_mat(mat: &opencv::core::Mat) -> Result<Self, VisionError> {
        use opencv::prelude::*;

        let (cols, rows) = (mat.cols(), mat.rows());
        if cols <= 0 || rows <= 0 {
            return Err(VisionError::Camera("Empty frame".to_string()));
        }
        if mat.channels() != 3 {
            return Err(VisionError::Processing(format!(
                "Expected 3-channel frame, got {}",
                mat.channels()
            )));
        }
        let data = if mat.is_continuous() {
            mat.data_bytes()?.to_vec()
        } else {
            mat.try_clone()?.data_bytes()?.to_vec()
        };
        Frame::new(cols as u32, rows as u32, data)
    }
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_validates_buffer() {
        assert!(Frame::new(2, 2, vec![0; 12]).is_ok());
        assert!(Frame::new(2, 2, vec![0; 11]).is_err());
        assert!(Frame::new(0, 2, vec![]).is_err());
        assert!(Frame::new(MAX_DIMENSION + 1, 1, vec![0; (MAX_DIMENSION as usize + 1) * 3]).is_err());
    }

    #[test]
    fn test_rgb_round_trip_swaps_channels() {
        let frame = Frame::filled(3, 2, [10, 20, 30]).unwrap();
        let rgb = frame.to_rgb().unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [30, 20, 10]);
        assert_eq!(Frame::from_rgb(&rgb).unwrap(), frame);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = Frame::filled(10, 10, [1, 2, 3]).unwrap();
        let crop = frame
            .crop(&BoundingBox::new(6.0, 7.0, 20.0, 20.0))
            .unwrap()
            .unwrap();
        assert_eq!((crop.width(), crop.height()), (4, 3));
        assert_eq!(crop.pixel(0, 0), Some([1, 2, 3]));

        assert!(frame.crop(&BoundingBox::new(12.0, 0.0, 5.0, 5.0)).unwrap().is_none());
        assert!(frame.crop(&BoundingBox::new(f32::NAN, 0.0, 5.0, 5.0)).unwrap().is_none());
    }

    #[test]
    fn test_resize() {
        let frame = Frame::filled(8, 4, [5, 6, 7]).unwrap();
        let resized = frame.resize(4, 4).unwrap();
        assert_eq!(resized.data().len(), 4 * 4 * 3);
        assert_eq!(resized.pixel(3, 3), Some([5, 6, 7]));
        assert!(frame.resize(0, 4).is_err());
    }

    #[test]
    fn test_jpeg_encode_decode() {
        let frame = Frame::filled(16, 16, [0, 0, 255]).unwrap();
        let jpeg = frame.to_jpeg(90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = Frame::decode(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 16));
        let [b, _, r] = decoded.pixel(8, 8).unwrap();
        assert!(r > 200 && b < 60);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut frame = Frame::filled(4, 4, [0, 0, 0]).unwrap();
        frame.fill_rect(-2, 2, 2, 9, [9, 8, 7]);
        assert_eq!(frame.pixel(0, 2), Some([9, 8, 7]));
        assert_eq!(frame.pixel(1, 3), Some([9, 8, 7]));
        assert_eq!(frame.pixel(2, 2), Some([0, 0, 0]));
        assert_eq!(frame.pixel(0, 1), Some([0, 0, 0]));

        frame.fill_rect(3, 3, 1, 1, [1, 1, 1]);
        assert_eq!(frame.pixel(2, 2), Some([0, 0, 0]));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(Frame::decode(b"not an image"), Err(VisionError::Decode(_))));
    }
}
