//! Callback fault containment.
//!
//! Every state callback runs under `catch_unwind`. A panic becomes a
//! [`Fault`] which the dispatcher handles according to the engine's
//! [`FaultPolicy`]:
//!
//! - [`FaultPolicy::Halt`] - stop the loop and report the fault from `stop()`
//! - [`FaultPolicy::FailSafe`] - switch to a designated safe state and keep ticking

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use kenate_common::config::EngineConfig;

use crate::state::StateHandle;

/// Which callback was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackPhase {
    /// `on_enter()`
    Enter,
    /// `on_update()`
    Update,
    /// `on_exit()`
    Exit,
}

impl fmt::Display for CallbackPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enter => "on_enter",
            Self::Update => "on_update",
            Self::Exit => "on_exit",
        })
    }
}

/// A panic caught inside a state callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Name of the faulted state.
    pub state: String,
    /// Callback that panicked.
    pub phase: CallbackPhase,
    /// Panic payload, when it was a string.
    pub message: String,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} panicked: {}", self.state, self.phase, self.message)
    }
}

/// Reaction to a contained callback fault.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FaultPolicy {
    /// Terminate the loop. The faulted state's `on_exit` still runs if it
    /// is owed, then `stop()` returns the fault.
    #[default]
    Halt,
    /// Exit the faulted state and enter the named state. A fault inside the
    /// fail-safe state itself escalates to `Halt`.
    FailSafe(String),
}

impl FaultPolicy {
    /// Policy described by an `[engine]` config table.
    pub fn from_config(config: &EngineConfig) -> Self {
        match &config.fail_safe_state {
            Some(name) => Self::FailSafe(name.clone()),
            None => Self::Halt,
        }
    }
}

/// Run one callback of `state`, converting a panic into a [`Fault`].
pub(crate) fn guarded(state: &StateHandle, phase: CallbackPhase) -> Result<(), Fault> {
    panic::catch_unwind(AssertUnwindSafe(|| state.invoke(phase))).map_err(|payload| Fault {
        state: state.name().to_string(),
        phase,
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FnState;

    #[test]
    fn ok_callback_is_not_a_fault() {
        let state = StateHandle::new(FnState::new("Fine", || {}));
        assert!(guarded(&state, CallbackPhase::Update).is_ok());
    }

    #[test]
    fn panic_becomes_fault() {
        let state = StateHandle::new(FnState::new("Broken", || panic!("encoder lost")));
        let fault = guarded(&state, CallbackPhase::Update).unwrap_err();
        assert_eq!(fault.state, "Broken");
        assert_eq!(fault.phase, CallbackPhase::Update);
        assert_eq!(fault.message, "encoder lost");
        assert_eq!(fault.to_string(), "Broken.on_update panicked: encoder lost");
    }

    #[test]
    fn formatted_panic_message_is_kept() {
        let state = StateHandle::new(FnState::new("Arm", || {
            let joint = 3;
            panic!("joint {joint} over limit");
        }));
        let fault = guarded(&state, CallbackPhase::Update).unwrap_err();
        assert_eq!(fault.message, "joint 3 over limit");
    }

    #[test]
    fn non_string_payload() {
        let state = StateHandle::new(FnState::new("Odd", || std::panic::panic_any(42_u8)));
        let fault = guarded(&state, CallbackPhase::Update).unwrap_err();
        assert_eq!(fault.message, "non-string panic payload");
    }

    #[test]
    fn state_is_usable_after_a_contained_panic() {
        let state = StateHandle::new(
            FnState::new("Flaky", || {}).with_enter(|| panic!("first enter fails")),
        );
        assert!(guarded(&state, CallbackPhase::Enter).is_err());
        assert!(guarded(&state, CallbackPhase::Update).is_ok());
    }

    #[test]
    fn policy_from_config() {
        let mut config = EngineConfig::default();
        assert_eq!(FaultPolicy::from_config(&config), FaultPolicy::Halt);
        config.fail_safe_state = Some("Brake".to_string());
        assert_eq!(
            FaultPolicy::from_config(&config),
            FaultPolicy::FailSafe("Brake".to_string())
        );
    }
}
