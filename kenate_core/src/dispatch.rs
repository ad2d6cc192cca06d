//! Thread-free tick core.
//!
//! [`Dispatcher`] applies the state-transition protocol and the fault
//! policy, one tick at a time. The engine's loop thread wraps it with
//! timing; tests and benchmarks drive it directly.
//!
//! ## Tick Protocol
//! 1. `begin()` - enter the initial state.
//! 2. `step(pending)` - if a transition is pending: exit current, swap,
//!    enter next. Then update current.
//! 3. `finish()` - exit current.
//!
//! `on_exit` runs exactly once per activation: the dispatcher remembers
//! whether the current state still owes an exit, including across faults.

use tracing::{debug, error, warn};

use crate::fault::{CallbackPhase, Fault, guarded};
use crate::state::StateHandle;

/// Result of one dispatcher call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Keep ticking.
    Continue,
    /// A callback faulted and the fail-safe state took over.
    Recovered(Fault),
    /// A callback faulted and the loop must stop.
    Halt(Fault),
}

/// Drives the callbacks of one current state at a time.
#[derive(Debug)]
pub struct Dispatcher {
    current: Option<StateHandle>,
    owes_exit: bool,
    fail_safe: Option<StateHandle>,
    transitions: u64,
}

impl Dispatcher {
    /// Create a dispatcher.
    ///
    /// `fail_safe` is the resolved [`FaultPolicy::FailSafe`](crate::FaultPolicy)
    /// target; `None` means faults halt.
    pub fn new(current: Option<StateHandle>, fail_safe: Option<StateHandle>) -> Self {
        Self {
            current,
            owes_exit: false,
            fail_safe,
            transitions: 0,
        }
    }

    /// State receiving updates.
    pub fn current(&self) -> Option<&StateHandle> {
        self.current.as_ref()
    }

    /// Transitions applied so far, fail-safe switches included.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// Fire the initial `on_enter`.
    pub fn begin(&mut self) -> Step {
        let Some(state) = self.current.clone() else {
            return Step::Continue;
        };
        self.owes_exit = true;
        debug!("Entering initial state '{}'", state.name());
        self.settle(guarded(&state, CallbackPhase::Enter))
    }

    /// Run one tick: apply `pending` if given, then update.
    pub fn step(&mut self, pending: Option<StateHandle>) -> Step {
        let outcome = match pending {
            Some(next) => self.switch_to(next).and_then(|()| self.update()),
            None => self.update(),
        };
        self.settle(outcome)
    }

    /// Fire the final `on_exit`, if still owed.
    pub fn finish(&mut self) -> Option<Fault> {
        let fault = self.exit_current().err();
        if let Some(fault) = &fault {
            error!("State callback fault during shutdown: {fault}");
        }
        fault
    }

    fn update(&mut self) -> Result<(), Fault> {
        match &self.current {
            Some(state) => guarded(state, CallbackPhase::Update),
            None => Ok(()),
        }
    }

    fn switch_to(&mut self, next: StateHandle) -> Result<(), Fault> {
        debug!(
            "Transition '{}' -> '{}'",
            self.current.as_ref().map_or("<none>", StateHandle::name),
            next.name()
        );
        self.exit_current()?;
        self.enter(next)
    }

    fn exit_current(&mut self) -> Result<(), Fault> {
        if !self.owes_exit {
            return Ok(());
        }
        self.owes_exit = false;
        match &self.current {
            Some(state) => guarded(state, CallbackPhase::Exit),
            None => Ok(()),
        }
    }

    fn enter(&mut self, next: StateHandle) -> Result<(), Fault> {
        self.current = Some(next.clone());
        self.owes_exit = true;
        self.transitions += 1;
        guarded(&next, CallbackPhase::Enter)
    }

    fn settle(&mut self, outcome: Result<(), Fault>) -> Step {
        match outcome {
            Ok(()) => Step::Continue,
            Err(fault) => self.recover(fault),
        }
    }

    fn recover(&mut self, fault: Fault) -> Step {
        error!("State callback fault: {fault}");

        let Some(safe) = self.fail_safe.clone() else {
            return Step::Halt(fault);
        };
        if safe.name() == fault.state {
            error!("Fail-safe state '{}' faulted, halting", safe.name());
            return Step::Halt(fault);
        }

        if let Err(exit_fault) = self.exit_current() {
            error!("State callback fault while leaving faulted state: {exit_fault}");
        }
        match self.enter(safe) {
            Ok(()) => {
                warn!(
                    "Switched to fail-safe state '{}' after fault in '{}'",
                    self.current.as_ref().map_or("<none>", StateHandle::name),
                    fault.state
                );
                Step::Recovered(fault)
            }
            Err(enter_fault) => {
                error!("Fail-safe state failed to enter: {enter_fault}");
                Step::Halt(enter_fault)
            }
        }
    }
}
