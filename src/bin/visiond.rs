//! visiond - edge vision console daemon
//!
//! This daemon:
//! 1. Listens for detection metadata from the inference worker (TCP JSON)
//! 2. Receives the live RTP/JPEG video stream (UDP), decoding frames
//! 3. Optionally launches and supervises the inference worker process
//! 4. Aggregates everything on a single state-owning loop and renders
//!    periodic console stats until interrupted

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use vision_console::{
    list_models, run_console, ConnectionListener, ConsoleConfig, ConsoleEvent, FrameSource,
    InferenceMode, ListenerConfig, ProcessSupervisor, StatsRenderer, VideoConfig, WorkerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "visiond", version, about = "Edge vision console daemon")]
struct Args {
    /// TCP address for worker metadata (overrides config file)
    #[arg(long, env = "VISION_METADATA_ADDR")]
    metadata_addr: Option<String>,

    /// UDP address for the RTP/JPEG video stream (overrides config file)
    #[arg(long, env = "VISION_VIDEO_ADDR")]
    video_addr: Option<String>,

    /// Launch the inference worker with this model file. Without it the
    /// first model found for the selected mode is used; pass --no-worker
    /// to skip launching entirely.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Worker input source (device path or stream URL)
    #[arg(long, default_value = "/dev/video0")]
    input: String,

    /// Inference mode: detection, segmentation, or pose_estimation
    #[arg(long, default_value = "detection")]
    mode: InferenceMode,

    /// Write worker JSON reports to this file
    #[arg(long)]
    json_path: Option<PathBuf>,

    /// Run without launching an inference worker
    #[arg(long)]
    no_worker: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = ConsoleConfig::load()?;
    if let Some(addr) = args.metadata_addr.clone() {
        cfg.metadata_addr = addr;
    }
    if let Some(addr) = args.video_addr.clone() {
        cfg.video_addr = addr;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupt received; shutting down");
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("install interrupt handler")?;
    }

    let (events, event_rx) = mpsc::channel::<ConsoleEvent>();

    let listener = ConnectionListener::spawn(
        ListenerConfig {
            addr: cfg.metadata_addr.clone(),
        },
        events.clone(),
    )?;
    log::info!("metadata listener on {}", listener.addr);

    let video_events = events.clone();
    let video = FrameSource::spawn(
        VideoConfig {
            addr: cfg.video_addr.clone(),
        },
        move |frame: vision_console::Frame, fps: Option<vision_console::FpsSample>| {
            // Send only; the pipeline thread must never block on rendering.
            let _ = video_events.send(ConsoleEvent::Frame(frame, fps));
        },
    )?;
    log::info!("video pipeline on {}", video.addr);

    let mut supervisor = ProcessSupervisor::new(&cfg.worker_bin);
    if !args.no_worker {
        let worker_cfg = resolve_worker_config(&args, &cfg)?;
        log::info!(
            "launching worker: model={} input={} mode={}",
            worker_cfg.model_path.display(),
            worker_cfg.input_source,
            worker_cfg.inference_mode
        );
        supervisor.start(&worker_cfg)?;
    }

    // The console loop owns all state and runs on this thread.
    let state = run_console(
        event_rx,
        &mut StatsRenderer::default(),
        cfg.viewport,
        cfg.history_capacity,
        &shutdown,
    )?;

    log::info!(
        "shutting down: {} records, {} decode failures, avg fps {:.1}",
        state.records_seen(),
        state.decode_failures(),
        state.fps().map(|s| s.average).unwrap_or(0.0)
    );

    supervisor.stop()?;
    drop(events);
    listener.stop()?;
    video.stop()?;
    Ok(())
}

fn resolve_worker_config(args: &Args, cfg: &ConsoleConfig) -> Result<WorkerConfig> {
    let model_path = match args.model.clone() {
        Some(path) => path,
        None => {
            let available = list_models(&cfg.model_dir, args.mode);
            available.into_iter().next().ok_or_else(|| {
                anyhow!(
                    "no {} models under {}; pass --model or --no-worker",
                    args.mode,
                    cfg.model_dir.display()
                )
            })?
        }
    };
    Ok(WorkerConfig {
        model_path,
        input_source: args.input.clone(),
        inference_mode: args.mode,
        json_frame_interval: cfg.json_frame_interval,
        save_json: args.json_path.is_some(),
        json_path: args.json_path.clone(),
    })
}
