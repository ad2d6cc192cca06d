//! Kenate Common Library
//!
//! Shared constants, TOML configuration types and the hardware abstraction
//! contracts used by every Kenate crate.
//!
//! # Module Structure
//!
//! - [`consts`] - Default tick rate, limits and paths
//! - [`config`] - Configuration loading trait and engine/RT config types
//! - [`hal`] - Motor contract and an in-memory mock motor
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use kenate_common::prelude::*;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.frequency_hz, DEFAULT_FREQUENCY_HZ);
//! ```

pub mod config;
pub mod consts;
pub mod hal;
pub mod prelude;
