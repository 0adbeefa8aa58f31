//! JPEG decode and pixel-format conversion stages.

use anyhow::{Context, Result};
use image::DynamicImage;

use crate::frame::Frame;

/// Decode one JPEG access unit into an image.
///
/// Dimensions come out of the decoded unit itself; the pipeline never caches
/// them, since a sender may change resolution mid-stream.
pub fn decode_access_unit(jpeg: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(jpeg).context("decode jpeg access unit")
}

/// Normalize a decoded image to the packed RGB24 layout the renderer
/// consumes.
pub fn convert_to_frame(image: DynamicImage) -> Frame {
    let rgb = image.into_rgb8();
    let (width, height) = rgb.dimensions();
    Frame::new(width, height, rgb.into_raw())
}
