//! In-memory motor for simulation and tests.

use crate::consts::MOCK_MOTOR_STEP_S;
use crate::hal::motor::Motor;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

/// Motor shared between several states (e.g. patrol and avoidance both
/// driving the same wheel).
pub type SharedMotor = Arc<Mutex<MockMotor>>;

/// Simulated motor.
///
/// Stores the last command of each kind. Commanding a velocity also
/// integrates the position over one fixed `step`, approximating a loop that
/// commands the motor once per tick.
#[derive(Debug, Clone)]
pub struct MockMotor {
    name: String,
    velocity: f64,
    position: f64,
    effort: f64,
    step_s: f64,
}

impl MockMotor {
    /// Create a motor at rest with the default 1 ms integration step.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_step(name, MOCK_MOTOR_STEP_S)
    }

    /// Create a motor that integrates position over `step_s` seconds per
    /// velocity command. Use the tick interval of the driving loop.
    pub fn with_step(name: impl Into<String>, step_s: f64) -> Self {
        Self {
            name: name.into(),
            velocity: 0.0,
            position: 0.0,
            effort: 0.0,
            step_s,
        }
    }

    /// Wrap into a [`SharedMotor`].
    pub fn shared(self) -> SharedMotor {
        Arc::new(Mutex::new(self))
    }
}

impl Motor for MockMotor {
    fn set_velocity(&mut self, velocity: f64) {
        self.velocity = velocity;
        self.position += velocity * self.step_s;
        trace!("[MockMotor:{}] velocity={velocity}", self.name);
    }

    fn set_position(&mut self, position: f64) {
        self.position = position;
        trace!("[MockMotor:{}] position={position}", self.name);
    }

    fn set_effort(&mut self, effort: f64) {
        self.effort = effort;
        trace!("[MockMotor:{}] effort={effort}", self.name);
    }

    fn velocity(&self) -> f64 {
        self.velocity
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn effort(&self) -> f64 {
        self.effort
    }

    fn name(&self) -> &str {
        &self.name
    }
}
