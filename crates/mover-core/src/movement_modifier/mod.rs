//! Movement modifiers: timed, handle-addressable adjustments that change how
//! the rest of the simulation behaves without proposing motion themselves.

pub mod builtin;
mod group;

pub use group::MovementModifierGroup;

use std::sync::atomic::{AtomicU16, Ordering};

use serde::{Deserialize, Serialize};

use crate::blackboard::MoverBlackboard;
use crate::environment::MovementEnvironment;
use crate::net::NetPayload;
use crate::proposed_move::ProposedMove;
use crate::types::{MoverSyncState, MoverTimeStep};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque local identifier of a queued or active modifier. Zero is invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModifierHandle(u16);

impl ModifierHandle {
    /// The invalid handle.
    pub const INVALID: ModifierHandle = ModifierHandle(0);

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub fn raw(self) -> u16 {
        self.0
    }
}

/// Generates modifier handles. Never yields zero, wraps after `u16::MAX`.
#[derive(Debug)]
pub struct ModifierHandleGenerator {
    next: AtomicU16,
}

impl Default for ModifierHandleGenerator {
    fn default() -> Self {
        Self {
            next: AtomicU16::new(1),
        }
    }
}

impl ModifierHandleGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generate(&self) -> ModifierHandle {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return ModifierHandle(id);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MovementModifier
// ---------------------------------------------------------------------------

/// State shared by every movement modifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementModifierBase {
    /// `< 0` ends only when cancelled, `0` lasts one tick, `> 0` is a
    /// duration in milliseconds.
    pub duration_ms: f32,
    /// Simulation time the modifier became active, or negative if it has
    /// not started.
    pub start_sim_time_ms: f64,
    /// Local handle. Not replicated; restored from the local instance after
    /// a network update.
    #[serde(skip)]
    pub handle: ModifierHandle,
}

impl Default for MovementModifierBase {
    fn default() -> Self {
        Self {
            duration_ms: -1.0,
            start_sim_time_ms: -1.0,
            handle: ModifierHandle::INVALID,
        }
    }
}

impl MovementModifierBase {
    pub fn with_duration(duration_ms: f32) -> Self {
        Self {
            duration_ms,
            ..Default::default()
        }
    }

    pub fn has_started(&self) -> bool {
        self.start_sim_time_ms >= 0.0
    }

    /// Same rules as a layered move.
    pub fn is_finished(&self, current_sim_time_ms: f64) -> bool {
        if !self.has_started() {
            return false;
        }
        if self.duration_ms == 0.0 {
            return true;
        }
        self.duration_ms > 0.0
            && self.start_sim_time_ms + f64::from(self.duration_ms) <= current_sim_time_ms
    }
}

/// A timed adjustment to the simulation.
pub trait MovementModifier: NetPayload + ModifierClone {
    fn base(&self) -> &MovementModifierBase;

    fn base_mut(&mut self) -> &mut MovementModifierBase;

    /// Returns `true` if `other` is the same modifier as `self`. Only one of
    /// a matching pair may be active at a time.
    fn matches(&self, other: &dyn MovementModifier) -> bool {
        self.type_tag() == other.type_tag()
    }

    fn on_start(&mut self, _environment: &MovementEnvironment, _blackboard: &mut MoverBlackboard) {}

    fn on_end(&mut self, _environment: &MovementEnvironment, _blackboard: &mut MoverBlackboard) {}

    /// Runs before the active mode integrates.
    fn on_pre_movement(&mut self, _time_step: &MoverTimeStep, _blackboard: &mut MoverBlackboard) {}

    /// Runs after the new sync state has been committed.
    fn on_post_movement(
        &mut self,
        _time_step: &MoverTimeStep,
        _sync_state: &mut MoverSyncState,
        _blackboard: &mut MoverBlackboard,
    ) {
    }

    /// Adjusts the composed move before the mode integrates it.
    fn modify_proposed_move(&self, _proposed: &mut ProposedMove) {}

    /// Substitute for `mode_name`, or `None` to leave it alone.
    fn remap_mode(&self, _mode_name: &str) -> Option<&str> {
        None
    }

    fn describe(&self) -> String {
        format!(
            "{} (handle {}, duration {}ms)",
            self.type_tag(),
            self.base().handle.raw(),
            self.base().duration_ms
        )
    }
}

/// Cloning support for boxed [`MovementModifier`]s.
pub trait ModifierClone {
    fn clone_modifier(&self) -> Box<dyn MovementModifier>;
}

impl<T> ModifierClone for T
where
    T: MovementModifier + Clone,
{
    fn clone_modifier(&self) -> Box<dyn MovementModifier> {
        Box::new(self.clone())
    }
}

impl dyn MovementModifier {
    pub fn downcast_ref<T: MovementModifier>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: MovementModifier>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl Clone for Box<dyn MovementModifier> {
    fn clone(&self) -> Self {
        self.clone_modifier()
    }
}
