use std::sync::Mutex;

use tempfile::NamedTempFile;

use vision_console::config::ConsoleConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VISION_CONFIG",
        "VISION_METADATA_ADDR",
        "VISION_VIDEO_ADDR",
        "VISION_WORKER_BIN",
        "VISION_MODEL_DIR",
        "VISION_HISTORY_CAPACITY",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_apply_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ConsoleConfig::load().expect("load config");

    assert_eq!(cfg.metadata_addr, "0.0.0.0:57344");
    assert_eq!(cfg.video_addr, "0.0.0.0:5000");
    assert_eq!(cfg.history_capacity, 20);
    assert_eq!(cfg.json_frame_interval, 30);

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "metadata_addr": "127.0.0.1:57000",
        "video_addr": "127.0.0.1:5002",
        "history_capacity": 40,
        "worker": {
            "bin": "/opt/vision/detection-worker",
            "model_dir": "/opt/vision/models",
            "json_frame_interval": 10
        },
        "viewport": {
            "width": 1920,
            "height": 1080
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("VISION_CONFIG", file.path());
    std::env::set_var("VISION_METADATA_ADDR", "127.0.0.1:58000");
    std::env::set_var("VISION_HISTORY_CAPACITY", "5");

    let cfg = ConsoleConfig::load().expect("load config");

    assert_eq!(cfg.metadata_addr, "127.0.0.1:58000");
    assert_eq!(cfg.video_addr, "127.0.0.1:5002");
    assert_eq!(cfg.history_capacity, 5);
    assert_eq!(cfg.worker_bin.to_str().unwrap(), "/opt/vision/detection-worker");
    assert_eq!(cfg.model_dir.to_str().unwrap(), "/opt/vision/models");
    assert_eq!(cfg.json_frame_interval, 10);
    assert_eq!(cfg.viewport, (1920, 1080));

    clear_env();
}

#[test]
fn zero_json_frame_interval_disables_reporting() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{"worker": {"json_frame_interval": 0}}"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    std::env::set_var("VISION_CONFIG", file.path());

    // 0 means "no periodic reports", not an invalid interval.
    let cfg = ConsoleConfig::load().expect("load config");
    assert_eq!(cfg.json_frame_interval, 0);

    clear_env();
}

#[test]
fn rejects_non_numeric_history_capacity() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VISION_HISTORY_CAPACITY", "lots");
    assert!(ConsoleConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unparseable_addresses() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VISION_METADATA_ADDR", "not-an-address");
    assert!(ConsoleConfig::load().is_err());

    clear_env();
}
