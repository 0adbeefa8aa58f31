//! Single-owner console state.
//!
//! Every producer thread (metadata listener, video pipeline) publishes
//! into one `mpsc` channel of [`ConsoleEvent`]; this module drains that
//! channel on one thread and is the only mutator of the aggregated state.
//! Cross-thread locking on the state itself is therefore unnecessary, and
//! events from any single producer apply in the order they were sent.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::metadata::{MetadataEvent, MetadataHistory};
use crate::render::FrameRenderer;
use crate::video::FpsSample;

/// Render cadence for the console loop, roughly 30 Hz.
const RENDER_TICK: Duration = Duration::from_millis(33);

/// History placeholder shown when a metadata payload could not be decoded.
pub const DECODE_FAILURE_LINE: &str = "Failed to decode JSON data.";

/// Everything the producer threads can tell the console.
#[derive(Debug)]
pub enum ConsoleEvent {
    Metadata(MetadataEvent),
    Frame(Frame, Option<FpsSample>),
}

impl From<MetadataEvent> for ConsoleEvent {
    fn from(event: MetadataEvent) -> Self {
        ConsoleEvent::Metadata(event)
    }
}

/// Aggregated console state, mutated only by the owning loop.
pub struct ConsoleState {
    history: MetadataHistory,
    latest: Option<Frame>,
    fps: Option<FpsSample>,
    records_seen: u64,
    decode_failures: u64,
}

impl ConsoleState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            history: MetadataHistory::new(history_capacity),
            latest: None,
            fps: None,
            records_seen: 0,
            decode_failures: 0,
        }
    }

    pub fn apply(&mut self, event: ConsoleEvent) {
        match event {
            ConsoleEvent::Metadata(MetadataEvent::Record(record)) => {
                self.records_seen += 1;
                let line = record.display_line();
                log::info!("detection: {line}");
                self.history.append(line);
            }
            ConsoleEvent::Metadata(MetadataEvent::DecodeError(reason)) => {
                self.decode_failures += 1;
                log::warn!("metadata payload rejected: {reason}");
                // The operator sees the failure in the same panel as the
                // records it displaced.
                self.history.append(DECODE_FAILURE_LINE.to_string());
            }
            ConsoleEvent::Frame(frame, fps) => {
                self.latest = Some(frame);
                if fps.is_some() {
                    self.fps = fps;
                }
            }
        }
    }

    pub fn history(&self) -> &MetadataHistory {
        &self.history
    }

    /// Most recent frame, if any has arrived.
    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest.as_ref()
    }

    pub fn fps(&self) -> Option<FpsSample> {
        self.fps
    }

    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }
}

/// Drain events and drive the renderer until shutdown.
///
/// Runs on the caller's thread. The renderer repaints the most recent frame
/// on every ~33 ms tick, whether or not a new one has arrived; frames
/// superseded between ticks are never rendered, matching live-stream
/// semantics.
pub fn run_console(
    events: Receiver<ConsoleEvent>,
    renderer: &mut dyn FrameRenderer,
    viewport: (u32, u32),
    history_capacity: usize,
    shutdown: &Arc<AtomicBool>,
) -> Result<ConsoleState> {
    let mut state = ConsoleState::new(history_capacity);
    let mut last_render = Instant::now();

    while !shutdown.load(Ordering::SeqCst) {
        match events.recv_timeout(RENDER_TICK) {
            Ok(event) => state.apply(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("all event producers gone; console loop exiting");
                break;
            }
        }

        // The repaint cadence is decoupled from frame arrival.
        if last_render.elapsed() >= RENDER_TICK {
            if let Some(frame) = state.latest.as_ref() {
                if let Err(err) = renderer.render(frame, viewport) {
                    log::warn!("render failed: {err:#}");
                }
            }
            last_render = Instant::now();
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DetectionRecord;
    use std::sync::mpsc;

    struct CountingRenderer {
        calls: u64,
    }

    impl FrameRenderer for CountingRenderer {
        fn render(&mut self, _frame: &Frame, _viewport: (u32, u32)) -> Result<()> {
            self.calls += 1;
            Ok(())
        }
    }

    fn record(label: &str) -> DetectionRecord {
        DetectionRecord {
            label: label.to_string(),
            ..DetectionRecord::default()
        }
    }

    #[test]
    fn records_accumulate_in_arrival_order() {
        let mut state = ConsoleState::new(10);
        state.apply(MetadataEvent::Record(record("person")).into());
        state.apply(MetadataEvent::Record(record("car")).into());

        let lines: Vec<&str> = state.history().entries().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("label=person"));
        assert!(lines[1].contains("label=car"));
        assert_eq!(state.records_seen(), 2);
    }

    #[test]
    fn decode_errors_show_a_placeholder_in_history() {
        let mut state = ConsoleState::new(10);
        state.apply(MetadataEvent::Record(record("person")).into());
        state.apply(MetadataEvent::DecodeError("bad json".to_string()).into());

        assert_eq!(state.decode_failures(), 1);
        let lines: Vec<&str> = state.history().entries().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], DECODE_FAILURE_LINE);
    }

    #[test]
    fn newer_frame_supersedes_older() {
        let mut state = ConsoleState::new(10);
        state.apply(ConsoleEvent::Frame(Frame::new(2, 2, vec![0; 12]), None));
        state.apply(ConsoleEvent::Frame(Frame::new(4, 2, vec![0; 24]), None));

        let latest = state.latest_frame().expect("frame present");
        assert_eq!((latest.width, latest.height), (4, 2));
    }

    #[test]
    fn renderer_repaints_on_ticks_without_new_frames() {
        let (tx, rx) = mpsc::channel();
        tx.send(ConsoleEvent::Frame(Frame::new(2, 2, vec![0; 12]), None))
            .expect("send frame");

        let shutdown = Arc::new(AtomicBool::new(false));
        let stopper = {
            let shutdown = shutdown.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(250));
                shutdown.store(true, Ordering::SeqCst);
            })
        };

        let mut renderer = CountingRenderer { calls: 0 };
        run_console(rx, &mut renderer, (640, 480), 10, &shutdown).expect("console loop");
        stopper.join().expect("stopper thread");
        drop(tx);

        // One frame, many ticks: the repaint cadence must not depend on
        // arrival.
        assert!(
            renderer.calls >= 3,
            "expected repeated repaints of the same frame, got {}",
            renderer.calls
        );
    }

    #[test]
    fn fps_sample_persists_across_sampleless_frames() {
        let mut state = ConsoleState::new(10);
        let sample = FpsSample {
            instantaneous: 10.0,
            average: 10.0,
        };
        state.apply(ConsoleEvent::Frame(Frame::new(2, 2, vec![0; 12]), Some(sample)));
        state.apply(ConsoleEvent::Frame(Frame::new(2, 2, vec![0; 12]), None));

        assert_eq!(state.fps().map(|s| s.average), Some(10.0));
    }
}
