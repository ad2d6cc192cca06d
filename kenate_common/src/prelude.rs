//! Common re-exports.
//!
//! ```rust
//! use kenate_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, EngineConfig, KenateConfig, LogLevel, OverrunPolicy, RtConfig,
    SharedConfig,
};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{DEFAULT_FREQUENCY_HZ, MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};

// ─── HAL ────────────────────────────────────────────────────────────
pub use crate::hal::{MockMotor, Motor, SharedMotor};
