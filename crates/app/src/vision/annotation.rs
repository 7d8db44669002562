//! Drawing primitives for annotated and placeholder frames.
//!
//! Text uses a built-in 5x7 bitmap font scaled by an integer factor, so no
//! font files are needed at runtime.

use anyhow::{Result, anyhow};
use image::{Rgb, RgbImage};
use ml_core::Detection;
use video_ingest::Frame;

use crate::vision::data::DetectionCounts;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BANNER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BACKDROP_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const PLACEHOLDER_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const GLYPH_ADVANCE: i32 = 6;
const GLYPH_HEIGHT: i32 = 7;

/// Convert a raw BGR frame into an RGB image.
pub(crate) fn frame_to_image(frame: &Frame) -> Result<RgbImage> {
    frame.validate()?;
    let rgb = bgr_to_rgb(&frame.data);
    RgbImage::from_vec(frame.width as u32, frame.height as u32, rgb)
        .ok_or_else(|| anyhow!("failed to convert frame into image buffer"))
}

/// Draw detection boxes with labels and the per-category count banner.
pub(crate) fn annotate_detections(
    image: &mut RgbImage,
    detections: &[Detection],
    counts: &DetectionCounts,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;

    for detection in detections {
        let bbox = detection.bbox.clamped(width, height);
        draw_rectangle(
            image,
            bbox.left.round() as i32,
            bbox.top.round() as i32,
            bbox.right.round() as i32,
            bbox.bottom.round() as i32,
            BOX_COLOR,
        );
    }

    for detection in detections {
        let bbox = detection.bbox.clamped(width, height);
        let label = format!(
            "{} {:.0}%",
            detection.category,
            detection.confidence * 100.0
        );
        let x = bbox.left.round() as i32;
        let y = (bbox.top.round() as i32 - 12).max(0);
        fill_rect(
            image,
            x,
            y,
            x + text_width(&label, 1),
            y + GLYPH_HEIGHT + 1,
            BACKDROP_COLOR,
        );
        draw_text(image, x + 1, y + 1, &label, BOX_COLOR, 1);
    }

    let banner = counts.summary();
    let scale = 2;
    fill_rect(
        image,
        6,
        6,
        10 + text_width(&banner, scale) + 2,
        10 + GLYPH_HEIGHT * scale + 4,
        BACKDROP_COLOR,
    );
    draw_text(image, 10, 10, &banner, BANNER_COLOR, scale);
}

/// Black frame carrying one or more status lines.
pub(crate) fn placeholder_image(width: u32, height: u32, lines: &[String]) -> RgbImage {
    let mut image = RgbImage::new(width.max(1), height.max(1));
    let scale = if width >= 480 { 3 } else { 1 };
    let line_height = (GLYPH_HEIGHT + 6) * scale;
    let block_height = line_height * lines.len() as i32;
    let x = if width >= 480 { 50 } else { 2 };
    let mut y = (height as i32 - block_height).max(0) / 2;
    for line in lines {
        draw_text(&mut image, x, y, line, PLACEHOLDER_TEXT, scale);
        y += line_height;
    }
    image
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}

fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE * scale
}

fn draw_rectangle(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for x in left..=right {
        *image.get_pixel_mut(x as u32, top as u32) = color;
        *image.get_pixel_mut(x as u32, bottom as u32) = color;
    }
    for y in top..=bottom {
        *image.get_pixel_mut(left as u32, y as u32) = color;
        *image.get_pixel_mut(right as u32, y as u32) = color;
    }
}

fn fill_rect(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    color: Rgb<u8>,
) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let left = left.clamp(0, width.saturating_sub(1));
    let right = right.clamp(0, width.saturating_sub(1));
    let top = top.clamp(0, height.saturating_sub(1));
    let bottom = bottom.clamp(0, height.saturating_sub(1));

    for y in top..=bottom {
        for x in left..=right {
            *image.get_pixel_mut(x as u32, y as u32) = color;
        }
    }
}

/// Render `text` with its top-left corner at (`x`, `y`); pixels outside the
/// image are dropped.
fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>, scale: i32) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..5 {
                    if (pattern >> (4 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let px = x + col * scale + dx;
                            let py = y + row as i32 * scale + dy;
                            if px >= 0 && px < width && py >= 0 && py < height {
                                *image.get_pixel_mut(px as u32, py as u32) = color;
                            }
                        }
                    }
                }
            }
        }
        x += GLYPH_ADVANCE * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        '/' => [0b00001, 0b00010, 0b00010, 0b00100, 0b01000, 0b01000, 0b10000],
        ',' => [0, 0, 0, 0, 0b00110, 0b00100, 0b01000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(bits)
}
