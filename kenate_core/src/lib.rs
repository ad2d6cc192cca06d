//! # Kenate Core
//!
//! A fixed-rate control loop engine built on the "state over scripts" model:
//! robot behavior is a set of named states, each with enter/update/exit
//! callbacks, and the engine drives exactly one of them per tick on a
//! dedicated thread.
//!
//! ## Module Structure
//!
//! - [`state`] - `State` trait, shared `StateHandle`, closure-based `FnState`
//! - [`registry`] - Name → state map
//! - [`dispatch`] - Thread-free tick core (transition protocol + fault policy)
//! - [`cycle`] - Fixed-rate pacer, tick statistics, RT thread setup
//! - [`fault`] - Panic containment and fault policies
//! - [`engine`] - `Engine` facade and `TransitionHandle`
//! - [`error`] - `EngineError`
//! - [`sim`] - Simulation states on the mock motor
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kenate_core::{Engine, FnState};
//! use std::time::Duration;
//!
//! let engine = Engine::new();
//! engine.add_state(FnState::new("A", || println!("A tick")))?;
//! engine.add_state(FnState::new("B", || println!("B tick")))?;
//! engine.set_frequency(10.0)?;
//! engine.start()?;
//! std::thread::sleep(Duration::from_millis(350));
//! engine.set_state("B")?;
//! std::thread::sleep(Duration::from_millis(300));
//! engine.stop()?;
//! # Ok::<(), kenate_core::EngineError>(())
//! ```

pub mod cycle;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fault;
pub mod registry;
pub mod sim;
pub mod state;

pub use cycle::{CycleStats, Overrun, Pacer};
pub use dispatch::{Dispatcher, Step};
pub use engine::{Engine, TransitionHandle};
pub use error::EngineError;
pub use fault::{CallbackPhase, Fault, FaultPolicy};
pub use registry::StateRegistry;
pub use state::{FnState, State, StateHandle};
