//! Named scratch slots shared by the systems of one mover.
//!
//! Values here are caches, never authoritative state. Everything is dropped
//! on rollback so a resimulated frame cannot observe a value computed in a
//! timeline that no longer exists.

use std::any::Any;
use std::collections::HashMap;

use tracing::trace;

/// Well-known slot names.
pub mod keys {
    /// Last [`FloorCheckResult`](crate::environment::FloorCheckResult).
    pub const LAST_FLOOR_RESULT: &str = "last_floor_result";
    /// Simulation time (ms) at which the current mode was entered.
    pub const MODE_ENTERED_AT_MS: &str = "mode_entered_at_ms";
    /// Location where the last jump started.
    pub const JUMP_START_LOCATION: &str = "jump_start_location";
}

/// A string-keyed store of arbitrary values.
#[derive(Default)]
pub struct MoverBlackboard {
    slots: HashMap<String, Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for MoverBlackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MoverBlackboard")
            .field("slots", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MoverBlackboard {
    /// Creates an empty blackboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, replacing whatever was there.
    pub fn set<T: Any + Send + Sync>(&mut self, name: &str, value: T) {
        self.slots.insert(name.to_string(), Box::new(value));
    }

    /// Borrows the value under `name` if it exists and has type `T`.
    pub fn get<T: Any>(&self, name: &str) -> Option<&T> {
        self.slots.get(name).and_then(|v| v.downcast_ref())
    }

    /// Copies the value under `name` out if it exists and has type `T`.
    pub fn try_get<T: Any + Clone>(&self, name: &str) -> Option<T> {
        self.get::<T>(name).cloned()
    }

    /// Returns `true` if anything is stored under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Drops the value under `name`.
    pub fn invalidate(&mut self, name: &str) {
        self.slots.remove(name);
    }

    /// Drops every value.
    pub fn invalidate_all(&mut self) {
        trace!(count = self.slots.len(), "blackboard invalidated");
        self.slots.clear();
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let mut bb = MoverBlackboard::new();
        bb.set(keys::MODE_ENTERED_AT_MS, 1500.0f64);
        assert_eq!(bb.get::<f64>(keys::MODE_ENTERED_AT_MS), Some(&1500.0));
        assert_eq!(bb.get::<f32>(keys::MODE_ENTERED_AT_MS), None);
        assert_eq!(bb.try_get::<f64>(keys::MODE_ENTERED_AT_MS), Some(1500.0));
    }

    #[test]
    fn test_invalidate() {
        let mut bb = MoverBlackboard::new();
        bb.set("a", 1u32);
        bb.set("b", 2u32);
        bb.invalidate("a");
        assert!(!bb.contains("a"));
        assert!(bb.contains("b"));
        bb.invalidate_all();
        assert!(bb.is_empty());
    }
}
