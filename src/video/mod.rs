//! Live video pipeline: receive → depacketize → decode → convert.
//!
//! The pipeline reads RTP datagrams from a UDP socket, reassembles JPEG
//! access units (RFC 2435), decodes them, and hands packed-RGB frames to
//! the terminal sink. One buffer is in flight per stage; there is no frame
//! queue. If the consumer cannot keep pace, frames are simply superseded —
//! live-stream semantics, not playback.
//!
//! A depacketization or decode failure drops just that access unit; the
//! pipeline proceeds to the next without restarting. The terminal sink is a
//! constructor argument, so a pipeline without its consuming stage cannot
//! be built at all; a socket bind failure is the one fatal startup error,
//! reported once.

pub mod decode;
pub mod fps;
pub mod rtp;

use anyhow::{Context, Result};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::frame::Frame;
pub use fps::{FpsEstimator, FpsSample};
pub use rtp::{AccessUnit, RtpJpegDepacketizer};

pub const DEFAULT_VIDEO_ADDR: &str = "0.0.0.0:5000";

const RECV_POLL: Duration = Duration::from_millis(500);
const HEALTH_LOG_EVERY: Duration = Duration::from_secs(5);

/// Largest datagram we accept from the transport.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Terminal consuming stage of the pipeline.
///
/// `deliver` runs on the video thread for every converted frame and must
/// not block on rendering; hand the frame off (channel send, reference
/// swap) and return.
pub trait FrameSink: Send {
    fn deliver(&mut self, frame: Frame, fps: Option<FpsSample>);
}

impl<F> FrameSink for F
where
    F: FnMut(Frame, Option<FpsSample>) + Send,
{
    fn deliver(&mut self, frame: Frame, fps: Option<FpsSample>) {
        self(frame, fps)
    }
}

#[derive(Clone, Debug)]
pub struct VideoConfig {
    pub addr: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_VIDEO_ADDR.to_string(),
        }
    }
}

/// Handle to the running video pipeline thread.
#[derive(Debug)]
pub struct VideoHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl VideoHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow::anyhow!("video pipeline thread panicked"))?;
        }
        Ok(())
    }
}

pub struct FrameSource;

impl FrameSource {
    /// Bind the video transport and spawn the pipeline thread.
    ///
    /// The sink is required here by construction; there is no setter to
    /// forget. Bind failure aborts pipeline startup, once.
    pub fn spawn(config: VideoConfig, sink: impl FrameSink + 'static) -> Result<VideoHandle> {
        let socket = UdpSocket::bind(&config.addr)
            .with_context(|| format!("bind video transport on {}", config.addr))?;
        let addr = socket.local_addr()?;
        socket
            .set_read_timeout(Some(RECV_POLL))
            .context("set video socket read timeout")?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("video-pipeline".to_string())
            .spawn(move || run(socket, sink, shutdown_thread))?;

        Ok(VideoHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run(socket: UdpSocket, mut sink: impl FrameSink, shutdown: Arc<AtomicBool>) {
    let mut depacketizer = RtpJpegDepacketizer::new();
    let mut fps = FpsEstimator::new();
    let started = Instant::now();
    let mut last_health_log = Instant::now();
    let mut frames_delivered = 0u64;
    let mut units_undecodable = 0u64;
    let mut packet = vec![0u8; MAX_DATAGRAM];

    while !shutdown.load(Ordering::SeqCst) {
        let len = match socket.recv_from(&mut packet) {
            Ok((len, _)) => len,
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => {
                log::warn!("video receive failed: {err}");
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
        };

        match depacketizer.push(&packet[..len]) {
            Ok(Some(unit)) => {
                let now = started.elapsed().as_secs_f64();
                if process_unit(&unit, now, &mut fps, &mut sink) {
                    frames_delivered += 1;
                } else {
                    units_undecodable += 1;
                }
            }
            Ok(None) => {}
            Err(err) => log::debug!("rtp packet rejected: {err:#}"),
        }

        if last_health_log.elapsed() >= HEALTH_LOG_EVERY {
            log::info!(
                "video health: frames={} undecodable={} rtp_dropped={} avg_fps={:.1}",
                frames_delivered,
                units_undecodable,
                depacketizer.units_dropped(),
                fps.average().unwrap_or(0.0)
            );
            last_health_log = Instant::now();
        }
    }
}

/// Decode and convert one access unit, delivering the frame on success.
///
/// Returns whether a frame was delivered. A decode failure is scoped to
/// this unit and logged at debug only.
fn process_unit(
    unit: &AccessUnit,
    arrival_secs: f64,
    fps: &mut FpsEstimator,
    sink: &mut impl FrameSink,
) -> bool {
    let image = match decode::decode_access_unit(&unit.jpeg) {
        Ok(image) => image,
        Err(err) => {
            log::debug!("undecodable access unit dropped: {err:#}");
            return false;
        }
    };
    let frame = decode::convert_to_frame(image);
    let sample = fps.record(arrival_secs);
    sink.deliver(frame, sample);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn valid_unit(width: u32, height: u32) -> AccessUnit {
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(buffer)
            .write_to(
                &mut std::io::Cursor::new(&mut jpeg),
                image::ImageFormat::Jpeg,
            )
            .expect("encode jpeg");
        AccessUnit { jpeg, timestamp: 0 }
    }

    #[test]
    fn corrupt_unit_then_valid_unit_emits_one_frame() {
        let corrupt = AccessUnit {
            jpeg: vec![0xFF, 0xD8, 0xDE, 0xAD],
            timestamp: 0,
        };
        let valid = valid_unit(24, 24);

        let mut delivered: Vec<(u32, u32)> = Vec::new();
        let mut sink = |frame: Frame, _fps: Option<FpsSample>| {
            delivered.push((frame.width, frame.height));
        };
        let mut fps = FpsEstimator::new();

        assert!(!process_unit(&corrupt, 0.0, &mut fps, &mut sink));
        assert!(process_unit(&valid, 0.1, &mut fps, &mut sink));
        assert_eq!(delivered, vec![(24, 24)]);
    }

    #[test]
    fn fps_samples_accompany_frames_after_the_first() {
        let valid = valid_unit(16, 16);
        let mut samples: Vec<Option<FpsSample>> = Vec::new();
        let mut sink = |_frame: Frame, fps: Option<FpsSample>| samples.push(fps);
        let mut fps = FpsEstimator::new();

        process_unit(&valid, 0.0, &mut fps, &mut sink);
        process_unit(&valid, 0.5, &mut fps, &mut sink);

        assert!(samples[0].is_none());
        let sample = samples[1].expect("second frame has a sample");
        assert!((sample.instantaneous - 2.0).abs() < 1e-9);
    }

    #[test]
    fn spawn_requires_a_bindable_address() {
        let sink = |_frame: Frame, _fps: Option<FpsSample>| {};
        assert!(FrameSource::spawn(
            VideoConfig {
                addr: "definitely-not-an-address".to_string(),
            },
            sink,
        )
        .is_err());
    }
}
