//! Detection overlays for dashboard frames, upload results and chat snapshots.
//!
//! Boxes and labels are painted straight into the BGR buffer with a small
//! built-in 3x5 bitmap font, so no font files are needed at runtime.

use crate::detector::best_region;
use crate::frame::Frame;
use pawsense_core::{BoundingBox, Detection, EmotionLabel};

/// Green, in BGR
pub const DOG_BOX_COLOR: [u8; 3] = [0, 255, 0];
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];
const BOX_THICKNESS: i64 = 2;

const GLYPH_WIDTH: u32 = 3;
const GLYPH_HEIGHT: u32 = 5;
/// Blank column between glyphs
const GLYPH_SPACING: u32 = 1;

/// Rows top to bottom, bit 2 is the leftmost column
fn glyph(c: char) -> Option<[u8; 5]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b110],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        ' ' => [0; 5],
        _ => return None,
    };
    Some(rows)
}

/// Pixel width of `text` at `scale`
pub fn text_width(text: &str, scale: u32) -> u32 {
    let count = text.chars().count() as u32;
    if count == 0 {
        return 0;
    }
    (count * (GLYPH_WIDTH + GLYPH_SPACING) - GLYPH_SPACING) * scale
}

pub fn text_height(scale: u32) -> u32 {
    GLYPH_HEIGHT * scale
}

/// Paint `text` with its top-left corner at (x, y). Unsupported characters
/// leave a gap.
pub fn draw_text(frame: &mut Frame, x: i64, y: i64, text: &str, color: [u8; 3], scale: u32) {
    let scale = scale.max(1) as i64;
    let advance = (GLYPH_WIDTH + GLYPH_SPACING) as i64 * scale;
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else { continue };
        let gx = x + i as i64 * advance;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH as i64 {
                if bits & (0b100 >> col) != 0 {
                    let px = gx + col * scale;
                    let py = y + row as i64 * scale;
                    frame.fill_rect(px, py, px + scale, py + scale, color);
                }
            }
        }
    }
}

/// Rectangle outline drawn inside `bbox`
pub fn draw_box(frame: &mut Frame, bbox: &BoundingBox, color: [u8; 3], thickness: i64) {
    if ![bbox.x, bbox.y, bbox.width, bbox.height].iter().all(|v| v.is_finite()) {
        return;
    }
    let x0 = bbox.x.round() as i64;
    let y0 = bbox.y.round() as i64;
    let x1 = (bbox.x + bbox.width).round() as i64;
    let y1 = (bbox.y + bbox.height).round() as i64;
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let t = thickness.max(1);
    frame.fill_rect(x0, y0, x1, y0 + t, color);
    frame.fill_rect(x0, y1 - t, x1, y1, color);
    frame.fill_rect(x0, y0, x0 + t, y1, color);
    frame.fill_rect(x1 - t, y0, x1, y1, color);
}

/// BGR for the dashboard color of `label`
pub fn emotion_color(label: &EmotionLabel) -> [u8; 3] {
    let hex = label.color().trim_start_matches('#');
    let channel = |i: usize| {
        hex.get(i..i + 2)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .unwrap_or(255)
    };
    [channel(4), channel(2), channel(0)]
}

fn label_scale(frame: &Frame) -> u32 {
    (frame.height() / 160).clamp(1, 4)
}

/// Copy of `frame` with every dog boxed and tagged `DOG: p`, and the emotion
/// reading written as `EMOTION: p` under the most confident dog
pub fn annotate(frame: &Frame, detections: &[Detection], reading: Option<(&EmotionLabel, f32)>) -> Frame {
    let mut out = frame.clone();
    let scale = label_scale(frame);
    let pad = scale as i64;
    let tag_height = text_height(scale) as i64 + 2 * pad;

    for detection in detections {
        let bbox = &detection.bbox;
        draw_box(&mut out, bbox, DOG_BOX_COLOR, BOX_THICKNESS);
        if !bbox.x.is_finite() || !bbox.y.is_finite() {
            continue;
        }
        let text = format!("DOG: {:.2}", detection.confidence);
        let x = bbox.x.round() as i64;
        // above the box, or inside its top edge when there is no room
        let top = match bbox.y.round() as i64 - tag_height {
            y if y >= 0 => y,
            _ => bbox.y.round() as i64,
        };
        out.fill_rect(
            x,
            top,
            x + text_width(&text, scale) as i64 + 2 * pad,
            top + tag_height,
            DOG_BOX_COLOR,
        );
        draw_text(&mut out, x + pad, top + pad, &text, LABEL_TEXT_COLOR, scale);
    }

    if let (Some((label, confidence)), Some(best)) = (reading, best_region(detections)) {
        if best.x.is_finite() && best.y.is_finite() && best.height.is_finite() {
            let text = format!("{}: {:.2}", label.as_str().to_uppercase(), confidence);
            let below = (best.y + best.height).round() as i64 + pad * 2;
            let y = if below + text_height(scale) as i64 <= frame.height() as i64 {
                below
            } else {
                (best.y + best.height).round() as i64 - tag_height
            };
            draw_text(&mut out, best.x.round() as i64, y, &text, emotion_color(label), scale);
        }
    }
    out
}
