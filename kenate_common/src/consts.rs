//! System-wide constants for the Kenate workspace.
//!
//! Single source of truth for default rates, limits and paths.

/// Default control loop tick rate [Hz].
pub const DEFAULT_FREQUENCY_HZ: f64 = 100.0;

/// Lowest accepted tick rate [Hz]. One tick every ~16.7 minutes keeps every
/// deadline far inside the range of `Instant`.
pub const MIN_FREQUENCY_HZ: f64 = 1.0e-3;

/// Highest accepted tick rate [Hz]. Above this the tick interval rounds to
/// less than one nanosecond.
pub const MAX_FREQUENCY_HZ: f64 = 1.0e9;

/// Default name of the control loop thread.
pub const DEFAULT_LOOP_THREAD_NAME: &str = "kenate-loop";

/// Integration step used by the mock motor when a velocity is commanded [s].
pub const MOCK_MOTOR_STEP_S: f64 = 0.001;

/// Number of overrun warnings logged before switching to sampled logging.
pub const OVERRUN_WARN_BURST: u64 = 10;

/// After the initial burst, one overrun warning is logged every this many overruns.
pub const OVERRUN_WARN_EVERY: u64 = 1000;

/// Periodic cycle statistics are logged at DEBUG every this many ticks.
pub const STATS_LOG_EVERY: u64 = 1000;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kenate/kenate.toml";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_are_consistent() {
        assert!(DEFAULT_FREQUENCY_HZ > 0.0);
        assert!(DEFAULT_FREQUENCY_HZ <= MAX_FREQUENCY_HZ);
        assert!(MIN_FREQUENCY_HZ <= DEFAULT_FREQUENCY_HZ);
        assert!(MOCK_MOTOR_STEP_S > 0.0);
        assert!(OVERRUN_WARN_BURST < OVERRUN_WARN_EVERY);
        assert!(!DEFAULT_LOOP_THREAD_NAME.is_empty());
    }

    #[test]
    fn max_frequency_interval_is_at_least_one_nanosecond() {
        let interval = std::time::Duration::from_secs_f64(1.0 / MAX_FREQUENCY_HZ);
        assert!(interval >= std::time::Duration::from_nanos(1));
    }
}
