//! Simulation states driving a [`MockMotor`](kenate_common::hal::MockMotor).
//!
//! A patrol/avoidance pair coordinated through a shared obstacle flag, plus a
//! counting state for tests and benchmarks. States never switch the engine
//! themselves here: a supervisor reads the flag and calls `set_state`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kenate_common::hal::{Motor, SharedMotor};
use tracing::info;

use crate::state::State;

/// Name of [`PatrolState`].
pub const PATROL: &str = "Patrol";
/// Name of [`AvoidanceState`].
pub const AVOIDANCE: &str = "Avoidance";

const PATROL_VELOCITY: f64 = 1.0;
const REVERSE_VELOCITY: f64 = -0.5;

/// Counts `on_update` calls into a shared counter.
#[derive(Debug)]
pub struct CountingState {
    name: String,
    updates: Arc<AtomicU64>,
}

impl CountingState {
    pub fn new(name: impl Into<String>, updates: Arc<AtomicU64>) -> Self {
        Self {
            name: name.into(),
            updates,
        }
    }
}

impl State for CountingState {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_update(&mut self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }
}

/// Obstacle sensor polled by [`PatrolState`].
pub type Detector = Box<dyn FnMut() -> bool + Send>;

/// Drives forward and polls an obstacle detector.
pub struct PatrolState {
    motor: SharedMotor,
    obstacle: Arc<AtomicBool>,
    detector: Detector,
    check_every: u64,
    ticks: u64,
}

impl PatrolState {
    /// `check_every` is the detector period in ticks (at least 1).
    pub fn new(
        motor: SharedMotor,
        obstacle: Arc<AtomicBool>,
        detector: Detector,
        check_every: u64,
    ) -> Self {
        Self {
            motor,
            obstacle,
            detector,
            check_every: check_every.max(1),
            ticks: 0,
        }
    }
}

impl State for PatrolState {
    fn name(&self) -> &str {
        PATROL
    }

    fn on_enter(&mut self) {
        info!("[{PATROL}] Driving forward");
        self.ticks = 0;
    }

    fn on_update(&mut self) {
        self.motor.lock().set_velocity(PATROL_VELOCITY);
        self.ticks += 1;
        if self.ticks % self.check_every == 0 && (self.detector)() {
            info!("[{PATROL}] Obstacle detected");
            self.obstacle.store(true, Ordering::Release);
        }
    }

    fn on_exit(&mut self) {
        info!("[{PATROL}] Stopping patrol");
        self.motor.lock().set_velocity(0.0);
    }
}

/// Stops, then reverses until the obstacle is considered cleared.
pub struct AvoidanceState {
    motor: SharedMotor,
    obstacle: Arc<AtomicBool>,
    clear_after: u64,
    ticks: u64,
}

impl AvoidanceState {
    /// Clears the obstacle flag after `clear_after` updates.
    pub fn new(motor: SharedMotor, obstacle: Arc<AtomicBool>, clear_after: u64) -> Self {
        Self {
            motor,
            obstacle,
            clear_after,
            ticks: 0,
        }
    }
}

impl State for AvoidanceState {
    fn name(&self) -> &str {
        AVOIDANCE
    }

    fn on_enter(&mut self) {
        info!("[{AVOIDANCE}] Stopping and turning");
        self.ticks = 0;
        self.motor.lock().set_velocity(0.0);
    }

    fn on_update(&mut self) {
        self.motor.lock().set_velocity(REVERSE_VELOCITY);
        self.ticks += 1;
        if self.ticks == self.clear_after {
            info!("[{AVOIDANCE}] Path clear");
            self.obstacle.store(false, Ordering::Release);
        }
    }

    fn on_exit(&mut self) {
        info!("[{AVOIDANCE}] Resuming patrol");
    }
}

/// Mode the supervisor should request for the current obstacle flag.
pub fn desired_mode(obstacle: bool) -> &'static str {
    if obstacle { AVOIDANCE } else { PATROL }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kenate_common::hal::MockMotor;

    #[test]
    fn counting_state_counts() {
        let counter = Arc::new(AtomicU64::new(0));
        let mut state = CountingState::new("Count", Arc::clone(&counter));
        state.on_update();
        state.on_update();
        assert_eq!(state.name(), "Count");
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn patrol_polls_detector_periodically() {
        let motor = MockMotor::new("wheel").shared();
        let obstacle = Arc::new(AtomicBool::new(false));
        let polls = Arc::new(AtomicU64::new(0));
        let seen = Arc::clone(&polls);
        let mut patrol = PatrolState::new(
            Arc::clone(&motor),
            Arc::clone(&obstacle),
            Box::new(move || seen.fetch_add(1, Ordering::Relaxed) == 1),
            5,
        );

        patrol.on_enter();
        for _ in 0..9 {
            patrol.on_update();
        }
        assert_eq!(polls.load(Ordering::Relaxed), 1);
        assert!(!obstacle.load(Ordering::Acquire));

        patrol.on_update();
        assert_eq!(polls.load(Ordering::Relaxed), 2);
        assert!(obstacle.load(Ordering::Acquire));
        assert_eq!(motor.lock().velocity(), PATROL_VELOCITY);

        patrol.on_exit();
        assert_eq!(motor.lock().velocity(), 0.0);
    }

    #[test]
    fn avoidance_reverses_then_clears() {
        let motor = MockMotor::new("wheel").shared();
        let obstacle = Arc::new(AtomicBool::new(true));
        let mut avoid = AvoidanceState::new(Arc::clone(&motor), Arc::clone(&obstacle), 3);

        avoid.on_enter();
        assert_eq!(motor.lock().velocity(), 0.0);
        avoid.on_update();
        avoid.on_update();
        assert!(obstacle.load(Ordering::Acquire));
        assert_eq!(motor.lock().velocity(), REVERSE_VELOCITY);
        avoid.on_update();
        assert!(!obstacle.load(Ordering::Acquire));
    }

    #[test]
    fn patrol_moves_the_shared_motor_forward() {
        let motor = MockMotor::with_step("wheel", 0.01).shared();
        let mut patrol = PatrolState::new(
            Arc::clone(&motor),
            Arc::new(AtomicBool::new(false)),
            Box::new(|| false),
            1,
        );
        for _ in 0..10 {
            patrol.on_update();
        }
        assert!((motor.lock().position() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn supervisor_mode_selection() {
        assert_eq!(desired_mode(false), PATROL);
        assert_eq!(desired_mode(true), AVOIDANCE);
    }
}
