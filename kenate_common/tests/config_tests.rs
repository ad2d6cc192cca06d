//! Config file loading tests.
//!
//! Covers the `ConfigLoader` contract against real files: missing file,
//! malformed TOML, unknown enum values, and the sample config shipped in
//! `config/kenate.toml`.

use kenate_common::config::{
    ConfigError, ConfigLoader, KenateConfig, LogLevel, OverrunPolicy, RtConfig,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn missing_file_is_file_not_found() {
    let result = KenateConfig::load(Path::new("/nonexistent/kenate/kenate.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound)));
}

#[test]
fn malformed_toml_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "bad.toml", "[shared\nservice_name = ");
    assert!(matches!(
        KenateConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn unknown_overrun_policy_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "policy.toml",
        r#"
[shared]
service_name = "bot"

[engine]
overrun_policy = "catch_up"
"#,
    );
    assert!(matches!(
        KenateConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn full_document_round_trips_every_field() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "kenate.toml",
        r#"
[shared]
log_level = "debug"
service_name = "arm-cell"

[engine]
frequency_hz = 500.0
overrun_policy = "skip"
initial_state = "Idle"
fail_safe_state = "Brake"
thread_name = "arm-loop"

[rt]
cpu_core = 3
priority = 70
"#,
    );

    let config = KenateConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.shared.log_level, LogLevel::Debug);
    assert_eq!(config.shared.service_name, "arm-cell");
    assert_eq!(config.engine.frequency_hz, 500.0);
    assert_eq!(config.engine.overrun_policy, OverrunPolicy::Skip);
    assert_eq!(config.engine.initial_state.as_deref(), Some("Idle"));
    assert_eq!(config.engine.fail_safe_state.as_deref(), Some("Brake"));
    assert_eq!(config.engine.thread_name, "arm-loop");
    assert_eq!(
        config.rt,
        Some(RtConfig {
            cpu_core: 3,
            priority: 70
        })
    );
}

#[test]
fn loads_but_fails_validation_on_zero_frequency() {
    let dir = TempDir::new().unwrap();
    let path = write(
        dir.path(),
        "zero.toml",
        r#"
[shared]
service_name = "bot"

[engine]
frequency_hz = 0.0
"#,
    );
    let config = KenateConfig::load(&path).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
fn shipped_sample_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/kenate.toml");
    let config = KenateConfig::load(&path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.engine.initial_state.as_deref(), Some("Patrol"));
    assert_eq!(config.engine.fail_safe_state.as_deref(), Some("Avoidance"));
    assert!(config.rt.is_none());
}
