//! JPEG encoding for everything the sink publishes.

use actix_web::web::Bytes;
use anyhow::{Result, anyhow};
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use video_ingest::Frame;

use crate::vision::annotation::{frame_to_image, placeholder_image};

pub(crate) fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes> {
    let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(Bytes::from(buffer))
}

/// Encode an upstream frame as-is.
pub(crate) fn encode_frame(frame: &Frame, quality: u8) -> Result<Bytes> {
    let image = frame_to_image(frame)?;
    encode_jpeg(&image, quality)
}

/// Encode a placeholder frame showing `lines`.
pub(crate) fn render_placeholder(
    size: (u32, u32),
    lines: &[String],
    quality: u8,
) -> Result<Bytes> {
    encode_jpeg(&placeholder_image(size.0, size.1, lines), quality)
}
