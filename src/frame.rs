//! Decoded video frames.
//!
//! A `Frame` is the output of the video pipeline's convert stage: packed
//! RGB24 pixels plus the dimensions negotiated for *this* access unit.
//! Dimensions are carried per frame rather than cached on the pipeline,
//! because an RTP/JPEG sender may renegotiate resolution mid-stream.

use std::time::Instant;

/// One displayable video frame in packed RGB24 layout (3 bytes per pixel,
/// no row padding).
#[derive(Clone, Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
    /// Monotonic arrival instant, set by the convert stage.
    pub arrived: Instant,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), (width as usize) * (height as usize) * 3);
        Self {
            width,
            height,
            pixels,
            arrived: Instant::now(),
        }
    }

    /// Packed RGB24 pixel data, row-major, top-left origin.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}
