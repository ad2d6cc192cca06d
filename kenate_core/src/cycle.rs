//! Fixed-rate pacing, tick statistics and RT thread setup.
//!
//! ## Pacing
//! `next_wake` starts at loop start and advances by exactly one interval per
//! tick (fixed-rate, not fixed-delay), so the callback duration never shifts
//! the schedule. A tick that ends after its `next_wake` is an overrun,
//! handled per [`OverrunPolicy`].
//!
//! ## RT Setup Sequence (`rt` feature)
//! 1. `mlockall(MCL_CURRENT | MCL_FUTURE)` - lock all pages.
//! 2. Prefault stack pages.
//! 3. `sched_setaffinity` - pin to the configured CPU core.
//! 4. `sched_setscheduler(SCHED_FIFO, priority)` - RT priority.

use std::thread;
use std::time::{Duration, Instant};

use kenate_common::config::{OverrunPolicy, RtConfig};
use kenate_common::consts::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};

use crate::error::EngineError;

/// Tick interval for `hz`.
///
/// # Errors
///
/// [`EngineError::InvalidFrequency`] if `hz` is not finite or outside
/// [`MIN_FREQUENCY_HZ`]..=[`MAX_FREQUENCY_HZ`].
pub fn tick_interval(hz: f64) -> Result<Duration, EngineError> {
    if !hz.is_finite() || !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz) {
        return Err(EngineError::InvalidFrequency(hz));
    }
    let interval =
        Duration::try_from_secs_f64(1.0 / hz).map_err(|_| EngineError::InvalidFrequency(hz))?;
    if interval.is_zero() {
        return Err(EngineError::InvalidFrequency(hz));
    }
    Ok(interval)
}

// ─── Pacer ──────────────────────────────────────────────────────────

/// A tick that finished after its scheduled wake time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overrun {
    /// How far past `next_wake` the tick ended.
    pub late: Duration,
    /// Wake slots dropped by [`OverrunPolicy::Skip`]; always 0 under `Lag`.
    pub skipped: u64,
}

/// Absolute-deadline scheduler for the control loop.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_wake: Instant,
    policy: OverrunPolicy,
}

impl Pacer {
    /// Start a schedule now.
    pub fn new(interval: Duration, policy: OverrunPolicy) -> Self {
        Self::starting_at(Instant::now(), interval, policy)
    }

    /// Start a schedule at `origin`.
    pub fn starting_at(origin: Instant, interval: Duration, policy: OverrunPolicy) -> Self {
        Self {
            interval,
            next_wake: origin,
            policy,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_wake(&self) -> Instant {
        self.next_wake
    }

    /// Move the deadline forward by one interval.
    ///
    /// A deadline past the range of `Instant` is not representable; the
    /// deadline then stays where it is.
    #[inline]
    pub fn advance(&mut self) {
        if let Some(next) = self.next_wake.checked_add(self.interval) {
            self.next_wake = next;
        }
    }

    /// Compare `now` against the deadline and apply the overrun policy.
    ///
    /// Under `Skip`, `next_wake` is realigned to the first boundary of the
    /// fixed-rate schedule that is not in the past.
    pub fn settle(&mut self, now: Instant) -> Option<Overrun> {
        let late = now.checked_duration_since(self.next_wake)?;
        if late.is_zero() {
            return None;
        }
        let skipped = match self.policy {
            OverrunPolicy::Lag => 0,
            OverrunPolicy::Skip => {
                let interval_ns = self.interval.as_nanos();
                let slots = late.as_nanos().div_ceil(interval_ns);
                let jump_ns = u64::try_from(slots * interval_ns).unwrap_or(u64::MAX);
                if let Some(next) = self.next_wake.checked_add(Duration::from_nanos(jump_ns)) {
                    self.next_wake = next;
                }
                u64::try_from(slots).unwrap_or(u64::MAX)
            }
        };
        Some(Overrun { late, skipped })
    }

    /// Advance, settle against the clock, then sleep until the deadline.
    pub fn wait(&mut self) -> Option<Overrun> {
        self.advance();
        let now = Instant::now();
        let overrun = self.settle(now);
        if let Some(remaining) = self.next_wake.checked_duration_since(now) {
            if !remaining.is_zero() {
                thread::sleep(remaining);
            }
        }
        overrun
    }
}

// ─── Cycle Statistics ───────────────────────────────────────────────

/// O(1) per-tick timing statistics, published by the loop thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Ticks executed.
    pub tick_count: u64,
    /// Last tick duration [ns] (transition + update).
    pub last_tick_ns: u64,
    /// Minimum tick duration [ns].
    pub min_tick_ns: u64,
    /// Maximum tick duration [ns].
    pub max_tick_ns: u64,
    /// Running sum for average computation.
    pub sum_tick_ns: u64,
    /// Ticks that finished after their wake time.
    pub overruns: u64,
    /// Wake slots dropped under [`OverrunPolicy::Skip`].
    pub skipped_ticks: u64,
    /// Worst lateness seen [ns].
    pub max_lateness_ns: u64,
    /// Transitions applied, fail-safe switches included.
    pub transitions: u64,
    /// Contained callback faults.
    pub faults: u64,
}

impl CycleStats {
    /// Zeroed stats.
    pub const fn new() -> Self {
        Self {
            tick_count: 0,
            last_tick_ns: 0,
            min_tick_ns: u64::MAX,
            max_tick_ns: 0,
            sum_tick_ns: 0,
            overruns: 0,
            skipped_ticks: 0,
            max_lateness_ns: 0,
            transitions: 0,
            faults: 0,
        }
    }

    /// Record a tick duration. O(1), no allocation.
    #[inline]
    pub fn record(&mut self, duration_ns: u64) {
        self.tick_count += 1;
        self.last_tick_ns = duration_ns;
        self.min_tick_ns = self.min_tick_ns.min(duration_ns);
        self.max_tick_ns = self.max_tick_ns.max(duration_ns);
        self.sum_tick_ns = self.sum_tick_ns.saturating_add(duration_ns);
    }

    /// Record an overrun reported by the [`Pacer`].
    #[inline]
    pub fn record_overrun(&mut self, overrun: &Overrun) {
        self.overruns += 1;
        self.skipped_ticks += overrun.skipped;
        let late_ns = u64::try_from(overrun.late.as_nanos()).unwrap_or(u64::MAX);
        self.max_lateness_ns = self.max_lateness_ns.max(late_ns);
    }

    /// Average tick duration [ns] (0 if no ticks).
    #[inline]
    pub fn avg_tick_ns(&self) -> u64 {
        if self.tick_count == 0 {
            0
        } else {
            self.sum_tick_ns / self.tick_count
        }
    }
}

impl Default for CycleStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── RT Setup ───────────────────────────────────────────────────────

#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), EngineError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| EngineError::RtSetup(format!("mlockall failed: {e}")))
}

#[cfg(feature = "rt")]
fn prefault_stack() {
    // 256 KiB, well inside the default 2 MiB thread stack.
    let mut buf = [0u8; 256 * 1024];
    for byte in buf.iter_mut() {
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

#[cfg(feature = "rt")]
fn rt_set_affinity(cpu: usize) -> Result<(), EngineError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    cpuset
        .set(cpu)
        .map_err(|e| EngineError::RtSetup(format!("CpuSet::set({cpu}) failed: {e}")))?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
        .map_err(|e| EngineError::RtSetup(format!("sched_setaffinity failed: {e}")))
}

#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), EngineError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        let err = std::io::Error::last_os_error();
        return Err(EngineError::RtSetup(format!(
            "sched_setscheduler(SCHED_FIFO, {priority}) failed: {err}"
        )));
    }
    Ok(())
}

/// Apply the RT setup sequence to the calling thread.
///
/// Called on the loop thread before the first tick. Without the `rt`
/// feature this is a no-op.
#[cfg(feature = "rt")]
pub fn rt_setup(rt: &RtConfig) -> Result<(), EngineError> {
    rt_mlockall()?;
    prefault_stack();
    rt_set_affinity(rt.cpu_core)?;
    rt_set_scheduler(rt.priority)
}

/// Apply the RT setup sequence to the calling thread.
///
/// Called on the loop thread before the first tick. Without the `rt`
/// feature this is a no-op.
#[cfg(not(feature = "rt"))]
pub fn rt_setup(_rt: &RtConfig) -> Result<(), EngineError> {
    Ok(())
}

/// `true` if the calling thread runs under a real-time scheduling policy.
pub fn detect_rt_mode() -> bool {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        let policy = unsafe { sched_getscheduler(0) };
        policy == SCHED_FIFO || policy == SCHED_RR
    }
    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn interval_from_frequency() {
        assert_eq!(tick_interval(100.0).unwrap(), 10 * MS);
        assert_eq!(tick_interval(1.0).unwrap(), Duration::from_secs(1));
        assert!(tick_interval(MAX_FREQUENCY_HZ).is_ok());
        assert_eq!(
            tick_interval(MIN_FREQUENCY_HZ).unwrap(),
            Duration::from_secs(1000)
        );
    }

    #[test]
    fn invalid_frequencies_are_rejected() {
        for hz in [
            0.0,
            -5.0,
            1.0e-19,
            1.0e-20,
            f64::MIN_POSITIVE,
            MIN_FREQUENCY_HZ / 2.0,
            f64::NAN,
            f64::INFINITY,
            MAX_FREQUENCY_HZ * 10.0,
        ] {
            assert!(
                matches!(tick_interval(hz), Err(EngineError::InvalidFrequency(_))),
                "{hz} should be rejected"
            );
        }
    }

    #[test]
    fn advance_is_fixed_rate() {
        let origin = Instant::now();
        let mut pacer = Pacer::starting_at(origin, 10 * MS, OverrunPolicy::Lag);
        pacer.advance();
        pacer.advance();
        pacer.advance();
        assert_eq!(pacer.next_wake(), origin + 30 * MS);
    }

    #[test]
    fn unrepresentable_deadline_does_not_panic() {
        let origin = Instant::now();
        let mut pacer = Pacer::starting_at(origin, Duration::MAX, OverrunPolicy::Lag);
        pacer.advance();
        assert_eq!(pacer.next_wake(), origin);

        let mut pacer = Pacer::starting_at(origin, Duration::MAX, OverrunPolicy::Skip);
        let overrun = pacer.settle(origin + 5 * MS).unwrap();
        assert_eq!(overrun.skipped, 1);
    }

    #[test]
    fn on_time_tick_is_not_an_overrun() {
        let origin = Instant::now();
        let mut pacer = Pacer::starting_at(origin, 10 * MS, OverrunPolicy::Lag);
        pacer.advance();
        assert_eq!(pacer.settle(origin + 4 * MS), None);
        assert_eq!(pacer.settle(origin + 10 * MS), None);
    }

    #[test]
    fn lag_keeps_the_schedule() {
        let origin = Instant::now();
        let mut pacer = Pacer::starting_at(origin, 10 * MS, OverrunPolicy::Lag);
        pacer.advance();
        let overrun = pacer.settle(origin + 35 * MS).unwrap();
        assert_eq!(overrun.late, 25 * MS);
        assert_eq!(overrun.skipped, 0);
        assert_eq!(pacer.next_wake(), origin + 10 * MS);
    }

    #[test]
    fn skip_realigns_to_next_boundary() {
        let origin = Instant::now();
        let mut pacer = Pacer::starting_at(origin, 10 * MS, OverrunPolicy::Skip);
        pacer.advance();
        let overrun = pacer.settle(origin + 35 * MS).unwrap();
        assert_eq!(overrun.late, 25 * MS);
        assert_eq!(overrun.skipped, 3);
        assert_eq!(pacer.next_wake(), origin + 40 * MS);
    }

    #[test]
    fn skip_on_exact_boundary_does_not_overshoot() {
        let origin = Instant::now();
        let mut pacer = Pacer::starting_at(origin, 10 * MS, OverrunPolicy::Skip);
        pacer.advance();
        let overrun = pacer.settle(origin + 30 * MS).unwrap();
        assert_eq!(overrun.skipped, 2);
        assert_eq!(pacer.next_wake(), origin + 30 * MS);
    }

    #[test]
    fn wait_sleeps_until_deadline() {
        let start = Instant::now();
        let mut pacer = Pacer::starting_at(start, 5 * MS, OverrunPolicy::Lag);
        assert!(pacer.wait().is_none());
        assert!(pacer.wait().is_none());
        assert!(start.elapsed() >= 10 * MS);
    }

    #[test]
    fn cycle_stats_basic() {
        let mut stats = CycleStats::new();
        assert_eq!(stats.tick_count, 0);
        assert_eq!(stats.avg_tick_ns(), 0);

        stats.record(500_000);
        assert_eq!(stats.tick_count, 1);
        assert_eq!(stats.last_tick_ns, 500_000);
        assert_eq!(stats.min_tick_ns, 500_000);
        assert_eq!(stats.max_tick_ns, 500_000);

        stats.record(700_000);
        assert_eq!(stats.min_tick_ns, 500_000);
        assert_eq!(stats.max_tick_ns, 700_000);
        assert_eq!(stats.avg_tick_ns(), 600_000);
    }

    #[test]
    fn cycle_stats_overruns() {
        let mut stats = CycleStats::default();
        stats.record_overrun(&Overrun {
            late: 3 * MS,
            skipped: 0,
        });
        stats.record_overrun(&Overrun {
            late: MS,
            skipped: 2,
        });
        assert_eq!(stats.overruns, 2);
        assert_eq!(stats.skipped_ticks, 2);
        assert_eq!(stats.max_lateness_ns, 3_000_000);
    }

    #[test]
    fn rt_setup_no_rt_feature_is_noop() {
        #[cfg(not(feature = "rt"))]
        {
            let rt = RtConfig {
                cpu_core: 0,
                priority: 80,
            };
            assert!(rt_setup(&rt).is_ok());
        }
    }
}
