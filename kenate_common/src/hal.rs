//! Hardware abstraction contracts consumed by user states.
//!
//! The engine never talks to hardware itself: states drive devices from
//! their callbacks, on the control loop thread, at tick granularity.

pub mod mock;
pub mod motor;

pub use mock::{MockMotor, SharedMotor};
pub use motor::Motor;
