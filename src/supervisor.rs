//! Inference worker lifecycle.
//!
//! The worker is a black box: given a model path, input source, inference
//! mode, and reporting interval it runs independently and reports results
//! over the metadata listener. This module only starts and stops it.
//!
//! `start` while a worker is already active replaces it: the previous worker
//! is stopped first. `stop` asks politely (SIGTERM on unix), waits a bounded
//! interval, then kills. Worker exit between `start` and `stop` is not
//! observed; the handle only records that a start succeeded.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// How long `stop` waits for a graceful exit before escalating to a kill.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

const STOP_POLL: Duration = Duration::from_millis(50);

/// Inference mode passed through to the worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InferenceMode {
    Detection,
    Segmentation,
    PoseEstimation,
}

impl InferenceMode {
    /// Argument-vector spelling, also used as the per-mode model
    /// subdirectory name.
    pub fn as_arg(&self) -> &'static str {
        match self {
            InferenceMode::Detection => "detection",
            InferenceMode::Segmentation => "segmentation",
            InferenceMode::PoseEstimation => "pose_estimation",
        }
    }
}

impl fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arg())
    }
}

impl std::str::FromStr for InferenceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "detection" => Ok(InferenceMode::Detection),
            "segmentation" => Ok(InferenceMode::Segmentation),
            "poseestimation" | "pose_estimation" => Ok(InferenceMode::PoseEstimation),
            other => Err(ConfigError::new(format!(
                "unknown inference mode '{other}'"
            ))),
        }
    }
}

/// Everything a single worker launch needs.
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Path to the selected model file. Must resolve to a real file.
    pub model_path: PathBuf,
    /// Device id ("/dev/video0") or stream URL.
    pub input_source: String,
    pub inference_mode: InferenceMode,
    /// Frames between JSON reports; 0 disables periodic reporting.
    pub json_frame_interval: u32,
    /// Persist worker JSON output. Requires `json_path` when set.
    pub save_json: bool,
    pub json_path: Option<PathBuf>,
}

/// Invalid or missing `start` inputs. Synchronous and non-fatal: it aborts
/// only the one start attempt.
#[derive(Clone, Debug)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Running worker process. Created by `start`, cleared by `stop`.
struct WorkerHandle {
    child: Child,
}

/// Spawns and terminates the external inference worker.
pub struct ProcessSupervisor {
    worker_bin: PathBuf,
    handle: Option<WorkerHandle>,
}

impl ProcessSupervisor {
    pub fn new(worker_bin: impl Into<PathBuf>) -> Self {
        Self {
            worker_bin: worker_bin.into(),
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Validate the config and spawn the worker.
    ///
    /// An already-active worker is stopped first; this supervisor never
    /// runs two workers at once.
    pub fn start(&mut self, config: &WorkerConfig) -> Result<()> {
        validate(config)?;

        if self.handle.is_some() {
            log::warn!("worker already active; replacing it");
            self.stop()?;
        }

        let mut command = Command::new(&self.worker_bin);
        command
            .arg("--model")
            .arg(&config.model_path)
            .arg("--input")
            .arg(&config.input_source)
            .arg("--infer")
            .arg(config.inference_mode.as_arg())
            .arg("--jsonframe")
            .arg(config.json_frame_interval.to_string())
            .stdin(Stdio::null());
        if config.save_json {
            // Validation guarantees json_path is present here.
            if let Some(path) = &config.json_path {
                command.arg("--jsonpath").arg(path);
            }
        }

        let child = command
            .spawn()
            .with_context(|| format!("spawn worker {}", self.worker_bin.display()))?;
        log::info!(
            "worker started (pid {}): model={} input={} mode={} interval={}",
            child.id(),
            config.model_path.display(),
            config.input_source,
            config.inference_mode,
            config.json_frame_interval
        );
        self.handle = Some(WorkerHandle { child });
        Ok(())
    }

    /// Stop the active worker, if any. No-op without a handle.
    pub fn stop(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };
        let pid = handle.child.id();

        terminate_gracefully(&mut handle.child);

        let deadline = Instant::now() + STOP_GRACE;
        loop {
            match handle.child.try_wait().context("wait for worker exit")? {
                Some(status) => {
                    log::info!("worker (pid {pid}) exited: {status}");
                    return Ok(());
                }
                None if Instant::now() >= deadline => break,
                None => std::thread::sleep(STOP_POLL),
            }
        }

        log::warn!("worker (pid {pid}) did not exit within {STOP_GRACE:?}; killing");
        handle.child.kill().context("kill worker")?;
        let status = handle.child.wait().context("reap killed worker")?;
        log::info!("worker (pid {pid}) killed: {status}");
        Ok(())
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("failed to stop worker on shutdown: {err:#}");
        }
    }
}

fn validate(config: &WorkerConfig) -> std::result::Result<(), ConfigError> {
    if config.model_path.as_os_str().is_empty() {
        return Err(ConfigError::new("no model selected"));
    }
    if !config.model_path.is_file() {
        return Err(ConfigError::new(format!(
            "model file not found: {}",
            config.model_path.display()
        )));
    }
    if config.input_source.trim().is_empty() {
        return Err(ConfigError::new("input source is empty"));
    }
    if config.save_json && config.json_path.is_none() {
        return Err(ConfigError::new(
            "JSON persistence requested but no JSON path given",
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn terminate_gracefully(child: &mut Child) {
    // SIGTERM first so the worker can flush and release the camera.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if rc != 0 {
        log::debug!(
            "SIGTERM to worker pid {} failed: {}",
            child.id(),
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn terminate_gracefully(child: &mut Child) {
    if let Err(err) = child.kill() {
        log::debug!("kill worker pid {} failed: {}", child.id(), err);
    }
}

/// List model files (`.hef`) under the per-mode subdirectory of `model_dir`.
///
/// Returns an empty list when the directory is missing, matching the
/// operator-facing "no models found" presentation rather than erroring.
pub fn list_models(model_dir: &Path, mode: InferenceMode) -> Vec<PathBuf> {
    let dir = model_dir.join(mode.as_arg());
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut models: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("hef"))
                .unwrap_or(false)
        })
        .collect();
    models.sort();
    models
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config(model_path: PathBuf) -> WorkerConfig {
        WorkerConfig {
            model_path,
            input_source: "/dev/video0".to_string(),
            inference_mode: InferenceMode::Detection,
            json_frame_interval: 0,
            save_json: false,
            json_path: None,
        }
    }

    #[test]
    fn empty_model_path_is_config_error() {
        let config = valid_config(PathBuf::new());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("no model selected"));
    }

    #[test]
    fn missing_model_file_is_config_error() {
        let config = valid_config(PathBuf::from("/nonexistent/model.hef"));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn empty_input_source_is_config_error() {
        let model = tempfile::NamedTempFile::new().unwrap();
        let mut config = valid_config(model.path().to_path_buf());
        config.input_source = "  ".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("input source"));
    }

    #[test]
    fn save_json_requires_path() {
        let model = tempfile::NamedTempFile::new().unwrap();
        let mut config = valid_config(model.path().to_path_buf());
        config.save_json = true;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("JSON path"));

        config.json_path = Some(PathBuf::from("/tmp/results.json"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn inference_mode_parses_both_spellings() {
        assert_eq!(
            "PoseEstimation".parse::<InferenceMode>().unwrap(),
            InferenceMode::PoseEstimation
        );
        assert_eq!(
            "pose_estimation".parse::<InferenceMode>().unwrap(),
            InferenceMode::PoseEstimation
        );
        assert!("cartwheels".parse::<InferenceMode>().is_err());
    }

    #[test]
    fn stop_without_handle_is_noop() {
        let mut supervisor = ProcessSupervisor::new("worker-does-not-exist");
        assert!(supervisor.stop().is_ok());
        assert!(!supervisor.is_running());
    }

    #[test]
    fn list_models_of_missing_dir_is_empty() {
        let models = list_models(Path::new("/nonexistent"), InferenceMode::Detection);
        assert!(models.is_empty());
    }
}
