//! Local control and telemetry layer for an edge vision pipeline.
//!
//! The crate sits between an operator console and an external inference
//! worker. It owns three long-lived concerns:
//! - `metadata`: a self-restarting TCP listener receiving per-frame JSON
//!   detection reports from the worker, normalized into records and kept
//!   in a bounded history.
//! - `video`: a UDP RTP/JPEG receive pipeline that reassembles, decodes,
//!   and converts frames for display, with a running FPS estimate.
//! - `supervisor`: lifecycle control (spawn, bounded terminate) of the
//!   worker process itself.
//!
//! All producers feed one event channel drained by the `state` module,
//! which is the single owner of console state and drives the configured
//! `render::FrameRenderer`.

pub mod config;
pub mod frame;
pub mod metadata;
pub mod render;
pub mod state;
pub mod supervisor;
pub mod video;

pub use config::ConsoleConfig;
pub use frame::Frame;
pub use metadata::{
    decode_payload, ConnectionListener, DetectionRecord, ListenerConfig, ListenerHandle,
    MetadataEvent, MetadataHistory,
};
pub use render::{fit_within, FrameRenderer, StatsRenderer};
pub use state::{run_console, ConsoleEvent, ConsoleState};
pub use supervisor::{list_models, InferenceMode, ProcessSupervisor, WorkerConfig};
pub use video::{FpsEstimator, FpsSample, FrameSink, FrameSource, VideoConfig, VideoHandle};
