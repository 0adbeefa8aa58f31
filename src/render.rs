//! Presentation contract for decoded frames.
//!
//! The state owner drives a renderer on its tick; swapping presentation
//! backends (terminal stats, a future windowed surface) means swapping the
//! `FrameRenderer` implementation, nothing upstream changes.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Consumes the latest frame for display.
///
/// `render` is called from the state owner's thread with the most recent
/// frame and the current viewport size. Implementations scale with
/// [`fit_within`] so the frame keeps its aspect ratio.
pub trait FrameRenderer {
    fn render(&mut self, frame: &Frame, viewport: (u32, u32)) -> Result<()>;
}

/// Largest size at which `frame` fits inside `viewport` without changing
/// its aspect ratio. Zero-sized inputs collapse to (0, 0) rather than
/// dividing by zero.
pub fn fit_within(frame: (u32, u32), viewport: (u32, u32)) -> (u32, u32) {
    let (fw, fh) = frame;
    let (vw, vh) = viewport;
    if fw == 0 || fh == 0 || vw == 0 || vh == 0 {
        return (0, 0);
    }
    // Compare aspect ratios by cross-multiplying to stay in integers.
    if (fw as u64) * (vh as u64) >= (fh as u64) * (vw as u64) {
        // Width-bound: frame is proportionally wider than the viewport.
        let h = ((fh as u64 * vw as u64) / fw as u64) as u32;
        (vw, h.max(1))
    } else {
        let w = ((fw as u64 * vh as u64) / fh as u64) as u32;
        (w.max(1), vh)
    }
}

/// Headless renderer for the daemon: periodically logs what would be on
/// screen instead of drawing it.
pub struct StatsRenderer {
    every: Duration,
    last_report: Option<Instant>,
    frames_seen: u64,
}

impl StatsRenderer {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            last_report: None,
            frames_seen: 0,
        }
    }
}

impl Default for StatsRenderer {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl FrameRenderer for StatsRenderer {
    fn render(&mut self, frame: &Frame, viewport: (u32, u32)) -> Result<()> {
        self.frames_seen += 1;
        let due = self
            .last_report
            .map_or(true, |last| last.elapsed() >= self.every);
        if due {
            let (w, h) = fit_within((frame.width, frame.height), viewport);
            log::info!(
                "render: frame {}x{} -> {}x{} in {}x{} viewport ({} frames shown)",
                frame.width,
                frame.height,
                w,
                h,
                viewport.0,
                viewport.1,
                self.frames_seen
            );
            self.last_report = Some(Instant::now());
        }
        Ok(())
    }
}
