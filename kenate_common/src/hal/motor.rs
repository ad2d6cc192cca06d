//! Motor/actuator trait.
//!
//! States command motors through this trait so drivers can be swapped
//! (mock, CAN, EtherCAT, ...) without touching behavior code.

/// A velocity/position/effort controlled actuator.
///
/// # Timing Contracts
///
/// | Operation | Called from | Constraint |
/// |-----------|-------------|------------|
/// | setters | control loop thread | must return well within one tick |
/// | getters | control loop thread | must not block |
///
/// Implementations only need to be `Send`: a motor is driven by one state at
/// a time on the single loop thread. Share one motor between several states
/// through [`SharedMotor`](crate::hal::SharedMotor).
pub trait Motor: Send {
    /// Command a target velocity [units/s].
    fn set_velocity(&mut self, velocity: f64);

    /// Command a target position [units].
    fn set_position(&mut self, position: f64);

    /// Command a target effort (torque or force) [units].
    fn set_effort(&mut self, effort: f64);

    /// Last commanded or measured velocity.
    fn velocity(&self) -> f64;

    /// Last commanded or measured position.
    fn position(&self) -> f64;

    /// Last commanded or measured effort.
    fn effort(&self) -> f64;

    /// Stable identifier, e.g. `"left_wheel"`.
    fn name(&self) -> &str;
}
