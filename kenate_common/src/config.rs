//! Configuration loading trait and types.
//!
//! Every Kenate runner reads a single TOML file made of a `[shared]` table,
//! an `[engine]` table describing the control loop, and an optional `[rt]`
//! table for real-time thread placement.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "patrol-bot"
//!
//! [engine]
//! frequency_hz = 250.0
//! overrun_policy = "skip"
//! initial_state = "Patrol"
//! fail_safe_state = "Avoidance"
//!
//! [rt]
//! cpu_core = 2
//! priority = 80
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use kenate_common::config::{ConfigError, ConfigLoader, KenateConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = KenateConfig::load(Path::new("kenate.toml"))?;
//!     config.validate()?;
//!     println!("Tick rate: {} Hz", config.engine.frequency_hz);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_FREQUENCY_HZ, DEFAULT_LOOP_THREAD_NAME, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// Reading or TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log verbosity, lowercase in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-tick tracing.
    Trace,
    /// Transitions and periodic cycle statistics.
    Debug,
    /// Engine lifecycle.
    #[default]
    Info,
    /// Overruns, rejected requests.
    Warn,
    /// Contained callback faults.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Fields shared by every Kenate runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Instance identifier, used in log output.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the shared section.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the pacer does when a tick finishes after its scheduled wake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverrunPolicy {
    /// Keep the fixed-rate schedule. Late ticks run back to back until the
    /// loop has caught up; no tick is dropped.
    #[default]
    Lag,
    /// Drop the missed wake slots and resume at the next future boundary.
    Skip,
}

/// Control loop parameters (`[engine]` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tick rate [Hz].
    #[serde(default = "default_frequency_hz")]
    pub frequency_hz: f64,

    /// Behavior on tick overrun.
    #[serde(default)]
    pub overrun_policy: OverrunPolicy,

    /// State made current before the loop starts, instead of the first
    /// registered one.
    #[serde(default)]
    pub initial_state: Option<String>,

    /// State entered when a callback panics. `None` halts the loop instead.
    #[serde(default)]
    pub fail_safe_state: Option<String>,

    /// Name given to the control loop thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_frequency_hz() -> f64 {
    DEFAULT_FREQUENCY_HZ
}

fn default_thread_name() -> String {
    DEFAULT_LOOP_THREAD_NAME.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            overrun_policy: OverrunPolicy::default(),
            initial_state: None,
            fail_safe_state: None,
            thread_name: default_thread_name(),
        }
    }
}

impl EngineConfig {
    /// Validate the engine section.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` if:
    /// - `frequency_hz` is not finite or outside [`MIN_FREQUENCY_HZ`]..=[`MAX_FREQUENCY_HZ`]
    /// - `initial_state` or `fail_safe_state` is an empty string
    /// - `thread_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frequency_hz.is_finite()
            || !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&self.frequency_hz)
        {
            return Err(ConfigError::ValidationError(format!(
                "frequency_hz must be in [{MIN_FREQUENCY_HZ}, {MAX_FREQUENCY_HZ}], got {}",
                self.frequency_hz
            )));
        }
        for (field, value) in [
            ("initial_state", &self.initial_state),
            ("fail_safe_state", &self.fail_safe_state),
        ] {
            if matches!(value, Some(name) if name.is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "{field} cannot be an empty string"
                )));
            }
        }
        if self.thread_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "thread_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Real-time placement of the control loop thread (`[rt]` table).
///
/// Only applied when the `rt` feature of `kenate_core` is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtConfig {
    /// CPU core the loop thread is pinned to.
    pub cpu_core: usize,
    /// SCHED_FIFO priority (1..=99).
    pub priority: i32,
}

impl RtConfig {
    /// Validate the RT section.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` if `priority` is outside 1..=99.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=99).contains(&self.priority) {
            return Err(ConfigError::ValidationError(format!(
                "rt priority must be in 1..=99, got {}",
                self.priority
            )));
        }
        Ok(())
    }
}

/// Complete configuration file of a Kenate runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KenateConfig {
    /// Common runner fields.
    pub shared: SharedConfig,
    /// Control loop parameters.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Optional RT thread placement.
    #[serde(default)]
    pub rt: Option<RtConfig>,
}

impl KenateConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.engine.validate()?;
        if let Some(rt) = &self.rt {
            rt.validate()?;
        }
        Ok(())
    }
}

/// Loads any deserializable configuration type from a TOML file.
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if it cannot be read or is not valid TOML
///
/// Semantic validation is left to the caller (`validate()` on the loaded
/// value).
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Read and parse the TOML file at `path`.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound,
            _ => ConfigError::ParseError(format!("{}: {e}", path.display())),
        })?;
        Self::from_toml(&content)
    }

    /// Parse a TOML document.
    fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedConfig {
        SharedConfig {
            log_level: LogLevel::Info,
            service_name: "unit".to_string(),
        }
    }

    #[test]
    fn log_level_directives() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Trace.as_str(), "trace");
        assert_eq!(LogLevel::Error.as_str(), "error");
    }

    #[test]
    fn engine_defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.frequency_hz, DEFAULT_FREQUENCY_HZ);
        assert_eq!(config.overrun_policy, OverrunPolicy::Lag);
        assert_eq!(config.thread_name, DEFAULT_LOOP_THREAD_NAME);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_rejects_bad_frequencies() {
        for hz in [
            0.0,
            -10.0,
            1.0e-19,
            f64::MIN_POSITIVE,
            MIN_FREQUENCY_HZ / 2.0,
            f64::NAN,
            f64::INFINITY,
            MAX_FREQUENCY_HZ * 2.0,
        ] {
            let config = EngineConfig {
                frequency_hz: hz,
                ..EngineConfig::default()
            };
            assert!(
                matches!(config.validate(), Err(ConfigError::ValidationError(_))),
                "{hz} should be rejected"
            );
        }
    }

    #[test]
    fn engine_accepts_frequency_bounds() {
        for hz in [MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ] {
            let config = EngineConfig {
                frequency_hz: hz,
                ..EngineConfig::default()
            };
            assert!(config.validate().is_ok(), "{hz} should be accepted");
        }
    }

    #[test]
    fn engine_rejects_empty_state_names() {
        let config = EngineConfig {
            fail_safe_state: Some(String::new()),
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fail_safe_state"));
    }

    #[test]
    fn rt_priority_range() {
        let rt = |priority| RtConfig {
            cpu_core: 0,
            priority,
        };
        assert!(rt(80).validate().is_ok());
        assert!(rt(0).validate().is_err());
        assert!(rt(100).validate().is_err());
    }

    #[test]
    fn minimal_document_uses_defaults() {
        let config = KenateConfig::from_toml(
            r#"
[shared]
service_name = "bot"
"#,
        )
        .unwrap();
        assert_eq!(config.shared.log_level, LogLevel::Info);
        assert_eq!(config.engine, EngineConfig::default());
        assert!(config.rt.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn overrun_policy_is_lowercase_in_toml() {
        let config = KenateConfig::from_toml(
            r#"
[shared]
service_name = "bot"

[engine]
overrun_policy = "skip"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.overrun_policy, OverrunPolicy::Skip);
    }

    #[test]
    fn validate_walks_every_section() {
        let mut config = KenateConfig {
            shared: shared(),
            engine: EngineConfig::default(),
            rt: Some(RtConfig { cpu_core: 1, priority: 120 }),
        };
        assert!(config.validate().is_err());
        config.rt = None;
        assert!(config.validate().is_ok());
        config.shared.service_name = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
