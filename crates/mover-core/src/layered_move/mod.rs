//! Layered moves: timed, prioritised contributions to a mover's motion.
//!
//! A move is queued from gameplay code, promoted to active at the next flush
//! and then asked for a [`ProposedMove`] every tick until it finishes. The
//! queue and active lists live in [`LayeredMoveGroup`], which is part of the
//! replicated sync state.

pub mod builtin;
mod group;

pub use group::LayeredMoveGroup;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::blackboard::MoverBlackboard;
use crate::environment::MovementEnvironment;
use crate::net::NetPayload;
use crate::proposed_move::{MoveMixMode, ProposedMove};
use crate::types::{MoverTickStartData, MoverTimeStep};

/// What happens to the mover's velocity when a move ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishVelocityMode {
    /// Keep whatever velocity the move left behind.
    #[default]
    MaintainLastRootMotionVelocity,
    /// Set (or add, for additive moves) [`FinishVelocitySettings::set_velocity`].
    SetVelocity,
    /// Clamp speed to [`FinishVelocitySettings::clamp_velocity`].
    ClampVelocity,
}

/// Residual velocity policy applied on the tick a move ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinishVelocitySettings {
    /// Which policy applies.
    pub mode: FinishVelocityMode,
    /// Velocity used by [`FinishVelocityMode::SetVelocity`].
    pub set_velocity: Vec3,
    /// Speed limit used by [`FinishVelocityMode::ClampVelocity`].
    pub clamp_velocity: f32,
}

impl Default for FinishVelocitySettings {
    fn default() -> Self {
        Self {
            mode: FinishVelocityMode::MaintainLastRootMotionVelocity,
            set_velocity: Vec3::ZERO,
            clamp_velocity: 0.0,
        }
    }
}

/// State shared by every layered move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayeredMoveBase {
    /// How this move combines with others.
    pub mix_mode: MoveMixMode,
    /// Tie-break between conflicting overrides. Higher wins.
    pub priority: u8,
    /// `< 0` ends only when cancelled, `0` lasts one tick, `> 0` is a
    /// duration in milliseconds.
    pub duration_ms: f32,
    /// Simulation time the move became active, or negative if it has not
    /// started.
    pub start_sim_time_ms: f64,
    /// Residual velocity policy.
    pub finish_velocity: FinishVelocitySettings,
}

impl Default for LayeredMoveBase {
    fn default() -> Self {
        Self {
            mix_mode: MoveMixMode::AdditiveVelocity,
            priority: 0,
            duration_ms: -1.0,
            start_sim_time_ms: -1.0,
            finish_velocity: FinishVelocitySettings::default(),
        }
    }
}

impl LayeredMoveBase {
    pub fn new(mix_mode: MoveMixMode, duration_ms: f32) -> Self {
        Self {
            mix_mode,
            duration_ms,
            ..Default::default()
        }
    }

    /// Returns `true` once the move has been promoted to active.
    pub fn has_started(&self) -> bool {
        self.start_sim_time_ms >= 0.0
    }

    /// Returns `true` if the move should be removed at `current_sim_time_ms`.
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

    /// Milliseconds since the move started at `current_sim_time_ms`.
    pub fn elapsed_ms(&self, current_sim_time_ms: f64) -> f32 {
        if self.has_started() {
            (current_sim_time_ms - self.start_sim_time_ms) as f32
        } else {
            0.0
        }
    }
}

/// Read-only inputs to [`LayeredMove::generate_move`].
#[derive(Debug, Clone, Copy)]
pub struct MoveGenerationContext<'a> {
    pub time_step: &'a MoverTimeStep,
    pub start_state: &'a MoverTickStartData,
    pub environment: &'a MovementEnvironment,
}

/// A timed contribution to the motion of a mover.
pub trait LayeredMove: NetPayload + LayeredMoveClone {
    fn base(&self) -> &LayeredMoveBase;

    fn base_mut(&mut self) -> &mut LayeredMoveBase;

    /// Produces this tick's contribution. `None` contributes nothing.
    fn generate_move(
        &mut self,
        ctx: &MoveGenerationContext<'_>,
        blackboard: &mut MoverBlackboard,
    ) -> Option<ProposedMove>;

    /// Called once when the move is promoted to active.
    fn on_start(&mut self, _environment: &MovementEnvironment, _blackboard: &mut MoverBlackboard) {}

    /// Called once when the move is removed from the active list.
    fn on_end(
        &mut self,
        _environment: &MovementEnvironment,
        _blackboard: &mut MoverBlackboard,
        _current_sim_time_ms: f64,
    ) {
    }

    /// Human-readable summary for logs.
    fn describe(&self) -> String {
        let base = self.base();
        format!(
            "{} (mix {:?}, priority {}, duration {}ms)",
            self.type_tag(),
            base.mix_mode,
            base.priority,
            base.duration_ms
        )
    }
}

/// Cloning support for boxed [`LayeredMove`]s.
pub trait LayeredMoveClone {
    fn clone_move(&self) -> Box<dyn LayeredMove>;

    /// Copies `source` into `self` in place. Returns `false` if the concrete
    /// types differ.
    fn assign_from(&mut self, source: &dyn LayeredMove) -> bool;
}

impl<T> LayeredMoveClone for T
where
    T: LayeredMove + Clone,
{
    fn clone_move(&self) -> Box<dyn LayeredMove> {
        Box::new(self.clone())
    }

    fn assign_from(&mut self, source: &dyn LayeredMove) -> bool {
        match source.as_any().downcast_ref::<T>() {
            Some(source) => {
                self.clone_from(source);
                true
            }
            None => false,
        }
    }
}

impl dyn LayeredMove {
    pub fn downcast_ref<T: LayeredMove>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn downcast_mut<T: LayeredMove>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }
}

impl Clone for Box<dyn LayeredMove> {
    fn clone(&self) -> Self {
        self.clone_move()
    }
}
