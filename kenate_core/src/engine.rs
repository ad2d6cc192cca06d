//! The engine: state registry, transition requests and the loop thread.
//!
//! ## Threads
//! - Caller threads: `add_state`, `set_state`, `set_frequency`, `start`,
//!   `stop` and the observers. All take `&self`, so an engine can be shared
//!   behind an `Arc`.
//! - Loop thread (`kenate-loop` by default): the only thread that invokes
//!   state callbacks.
//!
//! ## Locking
//! Registry, current mirror and pending slot share one mutex. The loop holds
//! it only at tick boundaries and never across a callback, so a callback may
//! call `set_state` (or [`TransitionHandle::request`]) without deadlocking.
//!
//! ## Loop
//! 1. `on_enter()` of the current state.
//! 2. Per tick: apply a pending transition, `on_update()`, sleep until the
//!    next fixed-rate deadline.
//! 3. On stop or halt: `on_exit()` of the current state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, info_span, warn};

use kenate_common::config::{EngineConfig, OverrunPolicy, RtConfig};
use kenate_common::consts::{
    DEFAULT_FREQUENCY_HZ, DEFAULT_LOOP_THREAD_NAME, OVERRUN_WARN_BURST, OVERRUN_WARN_EVERY,
    STATS_LOG_EVERY,
};

use crate::cycle::{CycleStats, Pacer, detect_rt_mode, rt_setup, tick_interval};
use crate::dispatch::{Dispatcher, Step};
use crate::error::EngineError;
use crate::fault::{Fault, FaultPolicy};
use crate::registry::StateRegistry;
use crate::state::{State, StateHandle};

#[derive(Debug, Default)]
struct Slots {
    registry: StateRegistry,
    current: Option<StateHandle>,
    pending: Option<StateHandle>,
}

#[derive(Debug, Default)]
struct Telemetry {
    stats: CycleStats,
    last_fault: Option<Fault>,
}

/// State shared between the engine, its loop thread and transition handles.
#[derive(Debug, Default)]
struct Shared {
    running: AtomicBool,
    slots: Mutex<Slots>,
    telemetry: Mutex<Telemetry>,
    loop_thread: Mutex<Option<ThreadId>>,
}

impl Shared {
    fn request(&self, name: &str) -> Result<(), EngineError> {
        let mut slots = self.slots.lock();
        let Some(next) = slots.registry.get(name).cloned() else {
            drop(slots);
            warn!("Ignoring transition to unknown state '{name}'");
            return Err(EngineError::UnknownState(name.to_string()));
        };
        if let Some(previous) = slots.pending.replace(next) {
            debug!(
                "Pending transition to '{}' superseded by '{name}'",
                previous.name()
            );
        } else {
            debug!("Transition to '{name}' requested");
        }
        Ok(())
    }

    fn on_loop_thread(&self) -> bool {
        *self.loop_thread.lock() == Some(thread::current().id())
    }
}

#[derive(Debug, Clone)]
struct Settings {
    frequency_hz: f64,
    overrun_policy: OverrunPolicy,
    fault_policy: FaultPolicy,
    thread_name: String,
    initial_state: Option<String>,
    rt: Option<RtConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            overrun_policy: OverrunPolicy::default(),
            fault_policy: FaultPolicy::default(),
            thread_name: DEFAULT_LOOP_THREAD_NAME.to_string(),
            initial_state: None,
            rt: None,
        }
    }
}

/// Fixed-rate state machine runner.
///
/// Exactly one registered state is current. The loop thread calls its
/// `on_update()` once per tick and applies at most one requested transition
/// at the start of each tick.
///
/// ```rust,no_run
/// use kenate_core::{Engine, FnState};
///
/// let engine = Engine::new();
/// engine.add_state(FnState::new("Idle", || {}))?;
/// engine.add_state(FnState::new("Drive", || {}))?;
/// engine.set_frequency(50.0)?;
/// engine.start()?;
/// engine.set_state("Drive")?;
/// engine.stop()?;
/// # Ok::<(), kenate_core::EngineError>(())
/// ```
#[derive(Debug)]
pub struct Engine {
    shared: Arc<Shared>,
    settings: Mutex<Settings>,
    worker: Mutex<Option<JoinHandle<Option<Fault>>>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine at the default rate, `Lag` overruns, `Halt` on faults.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            settings: Mutex::new(Settings::default()),
            worker: Mutex::new(None),
        }
    }

    /// Engine configured from an `[engine]` table.
    ///
    /// # Errors
    ///
    /// [`EngineError::Config`] if the table does not validate.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let engine = Self::new();
        *engine.settings.lock() = Settings {
            frequency_hz: config.frequency_hz,
            overrun_policy: config.overrun_policy,
            fault_policy: FaultPolicy::from_config(config),
            thread_name: config.thread_name.clone(),
            initial_state: config.initial_state.clone(),
            rt: None,
        };
        Ok(engine)
    }

    // ─── Registration ───────────────────────────────────────────────

    /// Register a state under its name and return its shared handle.
    ///
    /// The first state registered becomes current without `on_enter` (that
    /// fires when the loop starts). Registering a name twice replaces the
    /// earlier state; the current and pending slots keep what they hold.
    ///
    /// # Errors
    ///
    /// [`EngineError::EmptyStateName`] if the state's name is empty.
    pub fn add_state<S: State + 'static>(&self, state: S) -> Result<StateHandle, EngineError> {
        self.add_shared(StateHandle::new(state))
    }

    /// Register an existing handle.
    pub fn add_shared(&self, handle: StateHandle) -> Result<StateHandle, EngineError> {
        if handle.name().is_empty() {
            return Err(EngineError::EmptyStateName);
        }
        let initial = self.settings.lock().initial_state.clone();
        let running = self.is_running();

        let mut slots = self.shared.slots.lock();
        if slots.registry.insert(handle.clone()).is_some() {
            warn!("State '{}' re-registered, replacing previous instance", handle.name());
        }
        let is_initial = !running && initial.as_deref() == Some(handle.name());
        if slots.current.is_none() || is_initial {
            slots.current = Some(handle.clone());
        }
        debug!("Registered state '{}' ({} total)", handle.name(), slots.registry.len());
        Ok(handle)
    }

    /// Make `name` current before the loop starts, without callbacks.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Running`] if the loop is running
    /// - [`EngineError::UnknownState`] if `name` is not registered
    pub fn set_initial_state(&self, name: &str) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::Running);
        }
        let mut slots = self.shared.slots.lock();
        let handle = slots
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownState(name.to_string()))?;
        slots.current = Some(handle);
        Ok(())
    }

    // ─── Transitions ────────────────────────────────────────────────

    /// Request a transition to `name`, applied at the start of the next tick.
    ///
    /// A later request before that tick replaces this one. Requesting the
    /// current state's own name re-runs its `on_exit`/`on_enter`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownState`] if `name` is not registered. Current and
    /// pending are left unchanged.
    pub fn set_state(&self, name: &str) -> Result<(), EngineError> {
        self.shared.request(name)
    }

    /// Cloneable handle for requesting transitions from inside state
    /// callbacks or other threads without borrowing the engine.
    pub fn transition_handle(&self) -> TransitionHandle {
        TransitionHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    // ─── Configuration ──────────────────────────────────────────────

    /// Set the tick rate. Read when the loop starts; a change while running
    /// takes effect on the next `start()`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidFrequency`] if `hz` is not finite, not positive,
    /// or too high to schedule.
    pub fn set_frequency(&self, hz: f64) -> Result<(), EngineError> {
        tick_interval(hz)?;
        self.settings.lock().frequency_hz = hz;
        if self.is_running() {
            warn!("Frequency set to {hz} Hz while running; takes effect on next start");
        } else {
            debug!("Frequency set to {hz} Hz");
        }
        Ok(())
    }

    pub fn set_overrun_policy(&self, policy: OverrunPolicy) {
        self.settings.lock().overrun_policy = policy;
    }

    pub fn set_fault_policy(&self, policy: FaultPolicy) {
        self.settings.lock().fault_policy = policy;
    }

    /// Pin and prioritise the loop thread on the next start (`rt` feature).
    pub fn set_rt_config(&self, rt: Option<RtConfig>) {
        self.settings.lock().rt = rt;
    }

    // ─── Lifecycle ──────────────────────────────────────────────────

    /// Spawn the loop thread. No-op if already running.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NoStates`] if nothing is registered
    /// - [`EngineError::UnknownState`] if the fail-safe state is not registered
    /// - [`EngineError::InvalidFrequency`] if the stored rate cannot be scheduled
    /// - [`EngineError::Spawn`] if the OS refuses the thread
    pub fn start(&self) -> Result<(), EngineError> {
        if self.shared.on_loop_thread() {
            warn!("start() called from the control loop thread; ignoring");
            return Ok(());
        }
        let mut worker = self.worker.lock();
        if self.is_running() {
            debug!("Engine already running");
            return Ok(());
        }
        if let Some(halted) = worker.take() {
            match halted.join() {
                Ok(Some(fault)) => warn!("Restarting after halt on fault: {fault}"),
                Ok(None) => {}
                Err(_) => warn!("Restarting after control loop thread panic"),
            }
        }

        let settings = self.settings.lock().clone();
        let interval = tick_interval(settings.frequency_hz)?;
        let (initial, fail_safe) = {
            let slots = self.shared.slots.lock();
            let Some(current) = slots.current.clone() else {
                return Err(EngineError::NoStates);
            };
            let fail_safe = match &settings.fault_policy {
                FaultPolicy::Halt => None,
                FaultPolicy::FailSafe(name) => Some(
                    slots
                        .registry
                        .get(name)
                        .cloned()
                        .ok_or_else(|| EngineError::UnknownState(name.clone()))?,
                ),
            };
            (current, fail_safe)
        };

        info!(
            "Starting engine at {} Hz ({:?} overruns) in state '{}'",
            settings.frequency_hz,
            settings.overrun_policy,
            initial.name()
        );

        self.shared.telemetry.lock().stats = CycleStats::new();
        self.shared.running.store(true, Ordering::Release);

        let control = ControlLoop {
            shared: Arc::clone(&self.shared),
            dispatcher: Dispatcher::new(Some(initial), fail_safe),
            interval,
            policy: settings.overrun_policy,
            rt: settings.rt,
        };
        let handle = thread::Builder::new()
            .name(settings.thread_name)
            .spawn(move || control.run())
            .map_err(|e| {
                self.shared.running.store(false, Ordering::Release);
                EngineError::Spawn(e)
            })?;
        *worker = Some(handle);
        Ok(())
    }

    /// Stop the loop and join its thread. No-op if not running.
    ///
    /// On return the last current state's `on_exit()` has run and no further
    /// `on_update()` will occur.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Fault`] if the loop halted on a callback fault
    ///   (reported once)
    /// - [`EngineError::StopFromLoopThread`] if called from a state callback
    /// - [`EngineError::LoopPanicked`] if the loop thread panicked
    pub fn stop(&self) -> Result<(), EngineError> {
        if self.shared.on_loop_thread() {
            return Err(EngineError::StopFromLoopThread);
        }
        let mut worker = self.worker.lock();
        let Some(handle) = worker.take() else {
            return Ok(());
        };
        self.shared.running.store(false, Ordering::Release);
        match handle.join() {
            Ok(None) => {
                info!("Engine stopped");
                Ok(())
            }
            Ok(Some(fault)) => Err(EngineError::Fault(fault)),
            Err(_) => Err(EngineError::LoopPanicked),
        }
    }

    // ─── Observers ──────────────────────────────────────────────────

    /// `true` between `start()` and `stop()`, unless the loop halted.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Name of the current state, as last published by the loop.
    pub fn current_state(&self) -> Option<String> {
        let slots = self.shared.slots.lock();
        slots.current.as_ref().map(|s| s.name().to_string())
    }

    /// Name of the transition waiting for the next tick.
    pub fn pending_state(&self) -> Option<String> {
        let slots = self.shared.slots.lock();
        slots.pending.as_ref().map(|s| s.name().to_string())
    }

    /// Registered names, sorted.
    pub fn state_names(&self) -> Vec<String> {
        self.shared.slots.lock().registry.names()
    }

    pub fn frequency(&self) -> f64 {
        self.settings.lock().frequency_hz
    }

    /// Snapshot of the current (or last) run's tick statistics.
    pub fn stats(&self) -> CycleStats {
        self.shared.telemetry.lock().stats
    }

    /// Most recent contained callback fault.
    pub fn last_fault(&self) -> Option<Fault> {
        self.shared.telemetry.lock().last_fault.clone()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        match self.stop() {
            Ok(()) => {}
            Err(EngineError::StopFromLoopThread) => {
                self.shared.running.store(false, Ordering::Release);
            }
            Err(e) => warn!("Engine stopped with error on drop: {e}"),
        }
    }
}

/// Requests transitions on an engine it does not keep alive.
///
/// Obtained from [`Engine::transition_handle`]. Safe to move into a state so
/// the state can switch the engine from its own callbacks; a request made
/// during tick N is applied at the start of tick N+1.
#[derive(Debug, Clone)]
pub struct TransitionHandle {
    shared: Weak<Shared>,
}

impl TransitionHandle {
    /// Same as [`Engine::set_state`].
    ///
    /// # Errors
    ///
    /// - [`EngineError::EngineGone`] once the engine has been dropped
    /// - [`EngineError::UnknownState`] if `name` is not registered
    pub fn request(&self, name: &str) -> Result<(), EngineError> {
        let shared = self.shared.upgrade().ok_or(EngineError::EngineGone)?;
        shared.request(name)
    }
}

// ─── Loop Thread ────────────────────────────────────────────────────

struct ControlLoop {
    shared: Arc<Shared>,
    dispatcher: Dispatcher,
    interval: Duration,
    policy: OverrunPolicy,
    rt: Option<RtConfig>,
}

impl ControlLoop {
    fn run(mut self) -> Option<Fault> {
        *self.shared.loop_thread.lock() = Some(thread::current().id());
        let span = info_span!("control_loop", interval_us = self.interval.as_micros() as u64);
        let _enter = span.enter();

        if let Some(rt) = &self.rt {
            if let Err(e) = rt_setup(rt) {
                warn!("RT setup failed, continuing without RT guarantees: {e}");
            }
        }
        if detect_rt_mode() {
            info!("Control loop running in real-time mode");
        } else {
            debug!("Control loop running in standard (non-RT) mode");
        }

        let mut stats = CycleStats::new();
        let begin = self.dispatcher.begin();
        let mut halt = self.absorb(begin, &mut stats);
        let mut pacer = Pacer::new(self.interval, self.policy);

        while halt.is_none() && self.shared.running.load(Ordering::Acquire) {
            let tick_start = Instant::now();

            let pending = self.shared.slots.lock().pending.take();
            let step = self.dispatcher.step(pending);
            halt = self.absorb(step, &mut stats);
            self.publish_current(&mut stats);

            stats.record(tick_start.elapsed().as_nanos() as u64);
            if stats.tick_count % STATS_LOG_EVERY == 0 {
                debug!(
                    "Cycle stats: ticks={}, avg={}ns, max={}ns, overruns={}",
                    stats.tick_count,
                    stats.avg_tick_ns(),
                    stats.max_tick_ns,
                    stats.overruns
                );
            }

            if halt.is_none() {
                if let Some(overrun) = pacer.wait() {
                    stats.record_overrun(&overrun);
                    if stats.overruns <= OVERRUN_WARN_BURST
                        || stats.overruns % OVERRUN_WARN_EVERY == 0
                    {
                        warn!(
                            "Tick overrun #{}: {}µs late, {} ticks skipped",
                            stats.overruns,
                            overrun.late.as_micros(),
                            overrun.skipped
                        );
                    }
                }
            }
            self.shared.telemetry.lock().stats = stats;
        }

        if halt.is_some() {
            self.shared.running.store(false, Ordering::Release);
        }
        if let Some(fault) = self.dispatcher.finish() {
            stats.faults += 1;
            self.shared.telemetry.lock().last_fault = Some(fault.clone());
            halt = halt.or(Some(fault));
        }
        self.publish_current(&mut stats);
        self.shared.telemetry.lock().stats = stats;
        *self.shared.loop_thread.lock() = None;

        info!(
            "Control loop exited after {} ticks ({} overruns, {} transitions, {} faults)",
            stats.tick_count, stats.overruns, stats.transitions, stats.faults
        );
        halt
    }

    fn absorb(&self, step: Step, stats: &mut CycleStats) -> Option<Fault> {
        match step {
            Step::Continue => None,
            Step::Recovered(fault) => {
                stats.faults += 1;
                self.shared.telemetry.lock().last_fault = Some(fault);
                None
            }
            Step::Halt(fault) => {
                stats.faults += 1;
                self.shared.telemetry.lock().last_fault = Some(fault.clone());
                Some(fault)
            }
        }
    }

    fn publish_current(&self, stats: &mut CycleStats) {
        let transitions = self.dispatcher.transitions();
        if transitions != stats.transitions {
            stats.transitions = transitions;
            self.shared.slots.lock().current = self.dispatcher.current().cloned();
        }
    }
}
