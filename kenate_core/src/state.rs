//! State capability contract.
//!
//! Robot behavior is split into discrete states. Each state owns three
//! callbacks that the engine invokes on its control loop thread:
//!
//! 1. `on_enter()` - once when the state becomes current
//! 2. `on_update()` - once per tick while current
//! 3. `on_exit()` - once when the state stops being current
//!
//! States are registered by value and wrapped into a [`StateHandle`], the
//! shared handle held by the registry and by the engine's current/pending
//! slots.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::fault::CallbackPhase;

/// A behavior unit driven by the engine.
///
/// `on_update` has no default: a state without update behavior does not
/// compile.
///
/// # Timing Contracts
///
/// | Callback | Invoked | Constraint |
/// |----------|---------|------------|
/// | `on_enter()` | before the first `on_update` of an activation | must not block indefinitely |
/// | `on_update()` | every tick | **must finish well within one tick period** |
/// | `on_exit()` | after the last `on_update` of an activation | must not block indefinitely |
///
/// All callbacks run on the single control loop thread, so implementations
/// never see concurrent calls and need no internal locking.
///
/// # Example
///
/// ```rust
/// use kenate_core::State;
///
/// struct Blink {
///     on: bool,
/// }
///
/// impl State for Blink {
///     fn name(&self) -> &str {
///         "Blink"
///     }
///
///     fn on_update(&mut self) {
///         self.on = !self.on;
///     }
/// }
/// ```
pub trait State: Send {
    /// Registry key. Must be non-empty and stable for the lifetime of the
    /// state; the engine captures it once at registration.
    fn name(&self) -> &str;

    /// Called once when this state becomes current.
    fn on_enter(&mut self) {}

    /// Called every tick while this state is current.
    fn on_update(&mut self);

    /// Called once when this state stops being current.
    fn on_exit(&mut self) {}
}

/// Shared, cheaply cloneable handle to a registered state.
///
/// The registry holds the canonical clone; the engine's current and pending
/// slots hold further clones of the same allocation. The name is captured
/// when the handle is created so lookups never lock the state.
#[derive(Clone)]
pub struct StateHandle {
    name: Arc<str>,
    inner: Arc<Mutex<dyn State>>,
}

impl StateHandle {
    /// Wrap an owned state.
    pub fn new<S: State + 'static>(state: S) -> Self {
        let name: Arc<str> = Arc::from(state.name());
        Self {
            name,
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// Wrap a state the caller keeps typed access to.
    ///
    /// Lock the caller's `Arc` only while the engine is stopped, or from
    /// inside a callback of a different state: the loop thread holds this
    /// lock for the duration of every callback.
    pub fn from_shared<S: State + 'static>(state: Arc<Mutex<S>>) -> Self {
        let name: Arc<str> = Arc::from(state.lock().name());
        Self { name, inner: state }
    }

    /// Name captured at creation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` when both handles point to the same state instance.
    pub fn ptr_eq(&self, other: &StateHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Invoke one callback.
    pub(crate) fn invoke(&self, phase: CallbackPhase) {
        let mut state = self.inner.lock();
        match phase {
            CallbackPhase::Enter => state.on_enter(),
            CallbackPhase::Update => state.on_update(),
            CallbackPhase::Exit => state.on_exit(),
        }
    }
}

impl fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateHandle").field(&self.name).finish()
    }
}

type Callback = Box<dyn FnMut() + Send>;

/// A state assembled from closures.
///
/// Handy for small behaviors and tests where a dedicated type is overkill.
///
/// ```rust
/// use kenate_core::FnState;
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
///
/// let ticks = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&ticks);
/// let idle = FnState::new("Idle", move || {
///     counter.fetch_add(1, Ordering::Relaxed);
/// })
/// .with_exit(|| println!("leaving Idle"));
/// ```
pub struct FnState {
    name: String,
    enter: Option<Callback>,
    update: Callback,
    exit: Option<Callback>,
}

impl FnState {
    /// Create a state with the mandatory update closure.
    pub fn new(name: impl Into<String>, update: impl FnMut() + Send + 'static) -> Self {
        Self {
            name: name.into(),
            enter: None,
            update: Box::new(update),
            exit: None,
        }
    }

    /// Set the enter closure.
    pub fn with_enter(mut self, enter: impl FnMut() + Send + 'static) -> Self {
        self.enter = Some(Box::new(enter));
        self
    }

    /// Set the exit closure.
    pub fn with_exit(mut self, exit: impl FnMut() + Send + 'static) -> Self {
        self.exit = Some(Box::new(exit));
        self
    }
}

impl State for FnState {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_enter(&mut self) {
        if let Some(enter) = self.enter.as_mut() {
            enter();
        }
    }

    fn on_update(&mut self) {
        (self.update)();
    }

    fn on_exit(&mut self) {
        if let Some(exit) = self.exit.as_mut() {
            exit();
        }
    }
}
