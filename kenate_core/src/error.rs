//! Engine error types.

use kenate_common::config::ConfigError;
use thiserror::Error;

use crate::fault::Fault;

/// Errors returned by [`Engine`](crate::Engine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No state is registered under the requested name.
    #[error("unknown state '{0}'")]
    UnknownState(String),

    /// A state reported an empty name at registration.
    #[error("state name must not be empty")]
    EmptyStateName,

    /// Frequency is not finite, not positive, or too high to schedule.
    #[error("invalid frequency {0} Hz")]
    InvalidFrequency(f64),

    /// `start()` was called before any state was registered.
    #[error("no states registered")]
    NoStates,

    /// The operation is only allowed while the engine is stopped.
    #[error("engine is running")]
    Running,

    /// The loop thread could not be spawned.
    #[error("failed to spawn control loop thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// `stop()` was called from inside a state callback.
    #[error("stop() called from the control loop thread")]
    StopFromLoopThread,

    /// The loop thread panicked outside of a contained callback.
    #[error("control loop thread panicked")]
    LoopPanicked,

    /// The loop halted on a state callback fault.
    #[error("control loop halted: {0}")]
    Fault(Fault),

    /// A [`TransitionHandle`](crate::TransitionHandle) outlived its engine.
    #[error("engine has been dropped")]
    EngineGone,

    /// Real-time thread setup failed.
    #[error("RT setup error: {0}")]
    RtSetup(String),

    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::CallbackPhase;

    #[test]
    fn display_messages() {
        assert_eq!(
            EngineError::UnknownState("Dock".into()).to_string(),
            "unknown state 'Dock'"
        );
        assert_eq!(
            EngineError::InvalidFrequency(-1.0).to_string(),
            "invalid frequency -1 Hz"
        );
        let fault = Fault {
            state: "Patrol".into(),
            phase: CallbackPhase::Update,
            message: "lidar timeout".into(),
        };
        assert_eq!(
            EngineError::Fault(fault).to_string(),
            "control loop halted: Patrol.on_update panicked: lidar timeout"
        );
    }

    #[test]
    fn config_error_converts() {
        let err: EngineError = ConfigError::ValidationError("bad".into()).into();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
