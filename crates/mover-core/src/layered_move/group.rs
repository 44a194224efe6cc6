use glam::Vec3;
use tracing::{debug, trace, warn};

use super::{FinishVelocityMode, LayeredMove};
use crate::blackboard::MoverBlackboard;
use crate::environment::MovementEnvironment;
use crate::net::{self, NetReader, NetSerializeError, NetWriter};
use crate::registry::TypeRegistry;

/// Queued and active layered moves of one mover.
///
/// A move is in exactly one of the two lists. [`flush_move_arrays`] first
/// ends finished active moves and then promotes everything queued, so a move
/// queued this tick can never finish in the same flush.
///
/// [`flush_move_arrays`]: LayeredMoveGroup::flush_move_arrays
#[derive(Debug)]
pub struct LayeredMoveGroup {
    active: Vec<Box<dyn LayeredMove>>,
    queued: Vec<Box<dyn LayeredMove>>,

    // Residual velocity gathered from moves that ended during the last
    // flush. Transient, never replicated.
    residual_velocity: Vec3,
    residual_clamping: f32,
    apply_residual_velocity: bool,
    residual_velocity_overridden: bool,
}

impl Default for LayeredMoveGroup {
    fn default() -> Self {
        Self {
            active: Vec::new(),
            queued: Vec::new(),
            residual_velocity: Vec3::ZERO,
            residual_clamping: -1.0,
            apply_residual_velocity: false,
            residual_velocity_overridden: false,
        }
    }
}

impl Clone for LayeredMoveGroup {
    fn clone(&self) -> Self {
        Self {
            active: self.active.clone(),
            queued: self.queued.clone(),
            residual_velocity: self.residual_velocity,
            residual_clamping: self.residual_clamping,
            apply_residual_velocity: self.apply_residual_velocity,
            residual_velocity_overridden: self.residual_velocity_overridden,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        clone_moves_from(&mut self.active, &source.active);
        clone_moves_from(&mut self.queued, &source.queued);
        self.residual_velocity = source.residual_velocity;
        self.residual_clamping = source.residual_clamping;
        self.apply_residual_velocity = source.apply_residual_velocity;
        self.residual_velocity_overridden = source.residual_velocity_overridden;
    }
}

/// Copies `source` into `target`, assigning in place wherever the concrete
/// types line up.
fn clone_moves_from(target: &mut Vec<Box<dyn LayeredMove>>, source: &[Box<dyn LayeredMove>]) {
    target.truncate(source.len());
    for (index, src) in source.iter().enumerate() {
        match target.get_mut(index) {
            Some(dst) => {
                if !dst.assign_from(src.as_ref()) {
                    *dst = src.clone_move();
                }
            }
            None => target.push(src.clone_move()),
        }
    }
}

impl LayeredMoveGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `layered_move` to start at the next flush.
    ///
    /// A move whose duration is NaN cannot ever be scheduled and is dropped
    /// with a warning.
    pub fn queue_move(&mut self, layered_move: Box<dyn LayeredMove>) {
        if layered_move.base().duration_ms.is_nan() {
            warn!(
                layered_move = %layered_move.describe(),
                "dropping layered move with invalid duration"
            );
            return;
        }
        trace!(layered_move = %layered_move.describe(), "layered move queued");
        self.queued.push(layered_move);
    }

    /// Flushes and returns the moves that contribute this tick.
    pub fn generate_active_moves(
        &mut self,
        environment: &MovementEnvironment,
        blackboard: &mut MoverBlackboard,
        current_sim_time_ms: f64,
    ) -> &mut [Box<dyn LayeredMove>] {
        self.flush_move_arrays(environment, blackboard, current_sim_time_ms);
        &mut self.active
    }

    /// Ends finished active moves, then promotes every queued move.
    pub fn flush_move_arrays(
        &mut self,
        environment: &MovementEnvironment,
        blackboard: &mut MoverBlackboard,
        current_sim_time_ms: f64,
    ) {
        self.reset_residual_velocity();

        let mut index = 0;
        while index < self.active.len() {
            if self.active[index].base().is_finished(current_sim_time_ms) {
                let mut finished = self.active.remove(index);
                self.gather_residual_velocity(finished.as_ref());
                finished.on_end(environment, blackboard, current_sim_time_ms);
                debug!(layered_move = %finished.describe(), "layered move ended");
            } else {
                index += 1;
            }
        }

        for mut queued in self.queued.drain(..) {
            queued.base_mut().start_sim_time_ms = current_sim_time_ms;
            queued.on_start(environment, blackboard);
            debug!(layered_move = %queued.describe(), "layered move started");
            self.active.push(queued);
        }
    }

    fn reset_residual_velocity(&mut self) {
        self.residual_velocity = Vec3::ZERO;
        self.residual_clamping = -1.0;
        self.apply_residual_velocity = false;
        self.residual_velocity_overridden = false;
    }

    fn gather_residual_velocity(&mut self, finished: &dyn LayeredMove) {
        let base = finished.base();
        let settings = base.finish_velocity;
        let is_override = base.mix_mode.is_override();

        match settings.mode {
            FinishVelocityMode::MaintainLastRootMotionVelocity => {}
            FinishVelocityMode::SetVelocity if is_override => {
                if self.residual_velocity_overridden {
                    warn!(
                        layered_move = %finished.describe(),
                        "multiple finishing layered moves override residual velocity, last one wins"
                    );
                }
                self.residual_velocity = settings.set_velocity;
                self.residual_velocity_overridden = true;
                self.apply_residual_velocity = true;
            }
            FinishVelocityMode::SetVelocity => {
                if !self.residual_velocity_overridden {
                    self.residual_velocity += settings.set_velocity;
                }
                self.apply_residual_velocity = true;
            }
            FinishVelocityMode::ClampVelocity if is_override => {
                if self.residual_clamping >= 0.0 {
                    warn!(
                        layered_move = %finished.describe(),
                        "multiple finishing layered moves override residual clamping, last one wins"
                    );
                }
                self.residual_clamping = settings.clamp_velocity;
            }
            FinishVelocityMode::ClampVelocity => {
                if self.residual_clamping < 0.0 || settings.clamp_velocity < self.residual_clamping
                {
                    self.residual_clamping = settings.clamp_velocity;
                }
            }
        }
    }

    /// Applies the residual velocity gathered by the last flush to `velocity`.
    pub fn apply_residual_velocity(&self, velocity: Vec3) -> Vec3 {
        let mut velocity = velocity;
        if self.apply_residual_velocity {
            if self.residual_velocity_overridden {
                velocity = self.residual_velocity;
            } else {
                velocity += self.residual_velocity;
            }
        }
        if self.residual_clamping >= 0.0 {
            velocity = velocity.clamp_length_max(self.residual_clamping);
        }
        velocity
    }

    /// Returns `true` if the last flush left a residual velocity or clamp.
    pub fn has_residual_velocity(&self) -> bool {
        self.apply_residual_velocity || self.residual_clamping >= 0.0
    }

    /// Marks every active move of type `tag` to finish at the next flush and
    /// drops queued moves of that type. Returns how many were affected.
    pub fn cancel_moves_by_tag(&mut self, tag: &str) -> usize {
        let queued_before = self.queued.len();
        self.queued.retain(|m| m.type_tag() != tag);
        let mut cancelled = queued_before - self.queued.len();
        for active in self.active.iter_mut().filter(|m| m.type_tag() == tag) {
            active.base_mut().duration_ms = 0.0;
            cancelled += 1;
        }
        cancelled
    }

    pub fn active_moves(&self) -> &[Box<dyn LayeredMove>] {
        &self.active
    }

    pub fn queued_moves(&self) -> &[Box<dyn LayeredMove>] {
        &self.queued
    }

    /// First active move of type `tag`.
    pub fn find_active_move(&self, tag: &str) -> Option<&dyn LayeredMove> {
        self.active
            .iter()
            .find(|m| m.type_tag() == tag)
            .map(|m| m.as_ref())
    }

    /// Returns `true` if neither list holds anything.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.queued.is_empty()
    }

    /// Drops every move without running end callbacks.
    pub fn reset(&mut self) {
        self.active.clear();
        self.queued.clear();
        self.reset_residual_velocity();
    }

    // -----------------------------------------------------------------------
    // Wire
    // -----------------------------------------------------------------------

    /// Writes at most `max_moves` moves, active ones first.
    pub fn net_serialize(
        &self,
        writer: &mut NetWriter,
        max_moves: u8,
    ) -> Result<(), NetSerializeError> {
        let max_moves = usize::from(max_moves);
        let active_count = self.active.len().min(max_moves);
        let queued_count = self.queued.len().min(max_moves - active_count);
        if active_count + queued_count < self.active.len() + self.queued.len() {
            debug!(
                active = self.active.len(),
                queued = self.queued.len(),
                max_moves,
                "truncating layered moves for serialization"
            );
        }
        net::write_payload_array(writer, &self.active[..active_count])?;
        net::write_payload_array(writer, &self.queued[..queued_count])
    }

    /// Reads both move lists, reusing moves whose type is unchanged. The
    /// group is left untouched if either list fails to decode.
    pub fn net_deserialize(
        &mut self,
        reader: &mut NetReader<'_>,
        registry: &TypeRegistry<dyn LayeredMove>,
    ) -> Result<(), NetSerializeError> {
        let active = net::read_payload_array(reader, registry, self.active.clone())?;
        let queued = net::read_payload_array(reader, registry, self.queued.clone())?;
        self.active = active;
        self.queued = queued;
        Ok(())
    }
}

#[cfg(test)]
#[path = "group_tests.rs"]
mod tests;
