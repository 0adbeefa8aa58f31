use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::metadata::history::DEFAULT_HISTORY_CAPACITY;
use crate::metadata::listener::DEFAULT_METADATA_ADDR;
use crate::video::DEFAULT_VIDEO_ADDR;

const DEFAULT_WORKER_BIN: &str = "detection-worker";
const DEFAULT_MODEL_DIR: &str = "resources";
const DEFAULT_JSON_FRAME_INTERVAL: u32 = 30;
const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

#[derive(Debug, Deserialize, Default)]
struct ConsoleConfigFile {
    metadata_addr: Option<String>,
    video_addr: Option<String>,
    history_capacity: Option<usize>,
    worker: Option<WorkerConfigFile>,
    viewport: Option<ViewportConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct WorkerConfigFile {
    bin: Option<PathBuf>,
    model_dir: Option<PathBuf>,
    json_frame_interval: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ViewportConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub metadata_addr: String,
    pub video_addr: String,
    pub history_capacity: usize,
    pub worker_bin: PathBuf,
    pub model_dir: PathBuf,
    pub json_frame_interval: u32,
    pub viewport: (u32, u32),
}

impl ConsoleConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConsoleConfigFile) -> Self {
        let worker = file.worker.unwrap_or_default();
        let viewport = file.viewport.unwrap_or_default();
        Self {
            metadata_addr: file
                .metadata_addr
                .unwrap_or_else(|| DEFAULT_METADATA_ADDR.to_string()),
            video_addr: file
                .video_addr
                .unwrap_or_else(|| DEFAULT_VIDEO_ADDR.to_string()),
            history_capacity: file.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY),
            worker_bin: worker
                .bin
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKER_BIN)),
            model_dir: worker
                .model_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_DIR)),
            json_frame_interval: worker
                .json_frame_interval
                .unwrap_or(DEFAULT_JSON_FRAME_INTERVAL),
            viewport: (
                viewport.width.unwrap_or(DEFAULT_VIEWPORT_WIDTH),
                viewport.height.unwrap_or(DEFAULT_VIEWPORT_HEIGHT),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("VISION_METADATA_ADDR") {
            if !addr.trim().is_empty() {
                self.metadata_addr = addr;
            }
        }
        if let Ok(addr) = std::env::var("VISION_VIDEO_ADDR") {
            if !addr.trim().is_empty() {
                self.video_addr = addr;
            }
        }
        if let Ok(bin) = std::env::var("VISION_WORKER_BIN") {
            if !bin.trim().is_empty() {
                self.worker_bin = PathBuf::from(bin);
            }
        }
        if let Ok(dir) = std::env::var("VISION_MODEL_DIR") {
            if !dir.trim().is_empty() {
                self.model_dir = PathBuf::from(dir);
            }
        }
        if let Ok(capacity) = std::env::var("VISION_HISTORY_CAPACITY") {
            self.history_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("VISION_HISTORY_CAPACITY must be a positive integer"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(anyhow!("history capacity must be greater than zero"));
        }
        self.metadata_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| anyhow!("invalid metadata address '{}'", self.metadata_addr))?;
        self.video_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|_| anyhow!("invalid video address '{}'", self.video_addr))?;
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConsoleConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
