//! Registry of named states.
//!
//! Keys are unique; registering a second state under an existing name
//! replaces the first (last write wins).

use std::collections::HashMap;
use std::sync::Arc;

use crate::state::StateHandle;

/// Name → state map owned by an engine.
#[derive(Debug, Default)]
pub struct StateRegistry {
    states: HashMap<Arc<str>, StateHandle>,
}

impl StateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under its name, returning the handle it replaced.
    pub fn insert(&mut self, handle: StateHandle) -> Option<StateHandle> {
        self.states.insert(Arc::from(handle.name()), handle)
    }

    /// Look up a state by name.
    pub fn get(&self, name: &str) -> Option<&StateHandle> {
        self.states.get(name)
    }

    /// `true` if a state is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Number of registered states.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.states.keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FnState;

    fn handle(name: &str) -> StateHandle {
        StateHandle::new(FnState::new(name, || {}))
    }

    #[test]
    fn insert_and_get() {
        let mut reg = StateRegistry::new();
        assert!(reg.is_empty());
        assert!(reg.insert(handle("Patrol")).is_none());
        assert_eq!(reg.len(), 1);
        assert!(reg.contains("Patrol"));
        assert_eq!(reg.get("Patrol").map(StateHandle::name), Some("Patrol"));
        assert!(reg.get("Avoidance").is_none());
    }

    #[test]
    fn duplicate_name_replaces() {
        let mut reg = StateRegistry::new();
        let first = handle("Patrol");
        let second = handle("Patrol");
        reg.insert(first.clone());
        let replaced = reg.insert(second.clone()).expect("previous entry");
        assert!(replaced.ptr_eq(&first));
        assert!(reg.get("Patrol").unwrap().ptr_eq(&second));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let mut reg = StateRegistry::new();
        reg.insert(handle("b"));
        reg.insert(handle("c"));
        reg.insert(handle("a"));
        assert_eq!(reg.names(), vec!["a", "b", "c"]);
    }
}
