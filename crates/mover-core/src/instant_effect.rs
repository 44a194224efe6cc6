//! One-off changes applied to the sync state at the start of a tick.

use std::fmt::Debug;

use glam::{Quat, Vec3};
use tracing::debug;

use crate::default_data::MoverDefaultSyncState;
use crate::types::{MoverSyncState, MoverTimeStep};

/// An effect applied once, before mode resolution, on the next tick.
pub trait InstantMovementEffect: Send + Sync + Debug {
    /// Applies the effect. Returns `true` if the sync state changed.
    fn apply(&self, time_step: &MoverTimeStep, sync_state: &mut MoverSyncState) -> bool;
}

/// Moves the mover to a location, optionally changing its orientation.
#[derive(Debug, Clone)]
pub struct TeleportEffect {
    pub target_location: Vec3,
    pub target_orientation: Option<Quat>,
    /// Keep the current velocity instead of stopping.
    pub keep_velocity: bool,
}

impl InstantMovementEffect for TeleportEffect {
    fn apply(&self, time_step: &MoverTimeStep, sync_state: &mut MoverSyncState) -> bool {
        let state = sync_state
            .sync_state_collection
            .find_or_add_mut::<MoverDefaultSyncState>();
        state.location = self.target_location;
        if let Some(orientation) = self.target_orientation {
            state.orientation = orientation;
        }
        if !self.keep_velocity {
            state.velocity = Vec3::ZERO;
            state.angular_velocity = Vec3::ZERO;
        }
        debug!(frame = time_step.server_frame, location = ?self.target_location, "teleported");
        true
    }
}

/// Sets or adds to the mover's velocity, optionally forcing a mode.
#[derive(Debug, Clone)]
pub struct ApplyVelocityEffect {
    pub velocity: Vec3,
    /// Add to the current velocity instead of replacing it.
    pub additive: bool,
    pub force_movement_mode: Option<String>,
}

impl InstantMovementEffect for ApplyVelocityEffect {
    fn apply(&self, _time_step: &MoverTimeStep, sync_state: &mut MoverSyncState) -> bool {
        let state = sync_state
            .sync_state_collection
            .find_or_add_mut::<MoverDefaultSyncState>();
        if self.additive {
            state.velocity += self.velocity;
        } else {
            state.velocity = self.velocity;
        }
        if let Some(mode) = &self.force_movement_mode {
            sync_state.movement_mode.clone_from(mode);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teleport_stops_by_default() {
        let mut sync = MoverSyncState::default();
        sync.sync_state_collection.add(MoverDefaultSyncState {
            velocity: Vec3::X,
            ..Default::default()
        });
        let effect = TeleportEffect {
            target_location: Vec3::new(1.0, 2.0, 3.0),
            target_orientation: None,
            keep_velocity: false,
        };
        assert!(effect.apply(&MoverTimeStep::default(), &mut sync));
        let state = sync.sync_state_collection.find::<MoverDefaultSyncState>().unwrap();
        assert_eq!(state.location, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(state.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_apply_velocity_adds_and_forces_mode() {
        let mut sync = MoverSyncState::default();
        sync.sync_state_collection.add(MoverDefaultSyncState {
            velocity: Vec3::X,
            ..Default::default()
        });
        let effect = ApplyVelocityEffect {
            velocity: Vec3::Y,
            additive: true,
            force_movement_mode: Some("Falling".into()),
        };
        effect.apply(&MoverTimeStep::default(), &mut sync);
        let state = sync.sync_state_collection.find::<MoverDefaultSyncState>().unwrap();
        assert_eq!(state.velocity, Vec3::new(1.0, 1.0, 0.0));
        assert_eq!(sync.movement_mode, "Falling");
    }
}
