// tests/config_integration.rs
//! Layered configuration loading

use emg_stream::config::{ConfigLoader, StreamConfig};
use emg_stream::error::ConfigError;
use emg_stream::utils::MockClock;
use emg_stream::IngestCoordinator;
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn toml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{content}").unwrap();
    file
}

#[test]
#[serial]
fn test_later_files_override_earlier_ones() {
    let base = toml_file(
        r#"
[calibration]
duration_s = 5.0

[buffers]
high_water_mark = 800
trim_target = 600
"#,
    );
    let site = toml_file(
        r#"
[buffers]
trim_target = 700
"#,
    );

    let mut loader = ConfigLoader::with_paths(vec![base.path().to_path_buf(), site.path().to_path_buf()]);
    let config = loader.load_stream_config().unwrap();

    assert_eq!(config.calibration.duration_s, 5.0);
    assert_eq!(config.buffers.high_water_mark, 800);
    assert_eq!(config.buffers.trim_target, 700);
    // untouched sections keep their defaults
    assert_eq!(config.rms, StreamConfig::default().rms);
    assert_eq!(loader.get_current_config(), config);
}

#[test]
#[serial]
fn test_environment_beats_files() {
    let file = toml_file(
        r#"
[sampling]
reorder_window_s = 0.2
"#,
    );
    std::env::set_var("EMG_STREAM__SAMPLING__REORDER_WINDOW_S", "0.5");
    std::env::set_var("EMG_STREAM__RECORDING__AUTO_START", "false");

    let mut loader = ConfigLoader::with_paths(vec![file.path().to_path_buf()]);
    let result = loader.load_stream_config();

    std::env::remove_var("EMG_STREAM__SAMPLING__REORDER_WINDOW_S");
    std::env::remove_var("EMG_STREAM__RECORDING__AUTO_START");

    let config = result.unwrap();
    assert_eq!(config.sampling.reorder_window_s, 0.5);
    assert!(!config.recording.auto_start);
}

#[test]
#[serial]
fn test_inconsistent_file_is_rejected() {
    let file = toml_file(
        r#"
[gap_fill]
small_gap_threshold_s = 5.0
"#,
    );
    let mut loader = ConfigLoader::with_paths(vec![file.path().to_path_buf()]);
    match loader.load_stream_config() {
        Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[test]
#[serial]
fn test_exported_config_drives_coordinator() {
    let file = toml_file(
        r#"
[rms]
short_window_samples = 1
one_second_window_samples = 10
"#,
    );
    let mut loader = ConfigLoader::with_paths(vec![file.path().to_path_buf()]);
    let config = loader.load_stream_config().unwrap();

    let exported = NamedTempFile::new().unwrap();
    loader.export_config(exported.path()).unwrap();
    let mut reloaded = ConfigLoader::with_paths(vec![exported.path().to_path_buf()]);
    assert_eq!(reloaded.load_stream_config().unwrap(), config);

    let mut coordinator = IngestCoordinator::new(config, Arc::new(MockClock::new(0.0))).unwrap();
    for i in 0..10 {
        coordinator.ingest(&[2.0], i as f64 * 0.1, false).unwrap();
    }
    assert_eq!(coordinator.one_second_history().to_vec(), vec![2.0]);
}
