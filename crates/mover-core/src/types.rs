//! Value types carried through the simulation each tick.

use serde::{Deserialize, Serialize};

use crate::data_collection::MoverDataCollection;
use crate::layered_move::LayeredMoveGroup;
use crate::movement_modifier::MovementModifierGroup;
use crate::net::{NetReader, NetSerializeError, NetWriter};
use crate::registry::MoverTypeRegistry;

/// Timing of one simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MoverTimeStep {
    /// Frame index of the step.
    pub server_frame: i32,
    /// Simulation time at the start of the step, in milliseconds.
    pub base_sim_time_ms: f64,
    /// Length of the step in milliseconds.
    pub step_ms: f32,
    /// `true` while replaying a frame after a rollback.
    pub is_resimulating: bool,
}

impl MoverTimeStep {
    /// Simulation time at the end of the step.
    pub fn end_sim_time_ms(&self) -> f64 {
        self.base_sim_time_ms + f64::from(self.step_ms)
    }

    /// Step length in seconds.
    pub fn step_secs(&self) -> f32 {
        self.step_ms / 1000.0
    }
}

/// Per-collection caps applied when writing a sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeLimits {
    pub max_layered_moves: u8,
    pub max_modifiers: u8,
}

impl Default for SerializeLimits {
    fn default() -> Self {
        Self {
            max_layered_moves: 16,
            max_modifiers: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// The input consumed by one simulation step.
#[derive(Debug, Clone, Default)]
pub struct MoverInputCmdContext {
    pub input_collection: MoverDataCollection,
}

impl MoverInputCmdContext {
    pub fn net_serialize(&self, writer: &mut NetWriter) -> Result<(), NetSerializeError> {
        self.input_collection.net_serialize(writer)
    }

    pub fn net_deserialize(
        &mut self,
        reader: &mut NetReader<'_>,
        registry: &MoverTypeRegistry,
    ) -> Result<(), NetSerializeError> {
        self.input_collection.net_deserialize(reader, &registry.data)
    }
}

// ---------------------------------------------------------------------------
// Sync state
// ---------------------------------------------------------------------------

/// Authoritative replicated state of a mover.
#[derive(Debug, Clone, Default)]
pub struct MoverSyncState {
    /// Name of the active movement mode.
    pub movement_mode: String,
    pub layered_moves: LayeredMoveGroup,
    pub movement_modifiers: MovementModifierGroup,
    /// Kinematic and game-specific state fragments.
    pub sync_state_collection: MoverDataCollection,
}

impl MoverSyncState {
    pub fn net_serialize(
        &self,
        writer: &mut NetWriter,
        limits: SerializeLimits,
    ) -> Result<(), NetSerializeError> {
        writer.write_tag(&self.movement_mode)?;
        self.layered_moves
            .net_serialize(writer, limits.max_layered_moves)?;
        self.movement_modifiers
            .net_serialize(writer, limits.max_modifiers)?;
        self.sync_state_collection.net_serialize(writer)
    }

    pub fn net_deserialize(
        &mut self,
        reader: &mut NetReader<'_>,
        registry: &MoverTypeRegistry,
    ) -> Result<(), NetSerializeError> {
        let mode = reader.read_tag()?;
        if self.movement_mode != mode {
            self.movement_mode = mode.to_string();
        }
        self.layered_moves
            .net_deserialize(reader, &registry.layered_moves)?;
        self.movement_modifiers
            .net_deserialize(reader, &registry.modifiers)?;
        self.sync_state_collection
            .net_deserialize(reader, &registry.data)
    }

    /// Returns `true` if `self` has diverged from `authority`.
    ///
    /// Only the mode and the state collection take part. Move and modifier
    /// lists are truncated on the wire, so comparing them would flag
    /// corrections that are not real.
    pub fn should_reconcile(&self, authority: &MoverSyncState) -> bool {
        self.movement_mode != authority.movement_mode
            || self
                .sync_state_collection
                .should_reconcile(&authority.sync_state_collection)
    }

    /// Blend of `from` toward `to`. Discrete state comes from `to`.
    pub fn interpolate(from: &MoverSyncState, to: &MoverSyncState, pct: f32) -> MoverSyncState {
        let mut out = MoverSyncState {
            movement_mode: to.movement_mode.clone(),
            layered_moves: to.layered_moves.clone(),
            movement_modifiers: to.movement_modifiers.clone(),
            sync_state_collection: MoverDataCollection::new(),
        };
        out.sync_state_collection.interpolate(
            &from.sync_state_collection,
            &to.sync_state_collection,
            pct,
        );
        out
    }
}

/// Simulation-local state that is not replicated.
#[derive(Debug, Clone, Default)]
pub struct MoverAuxStateContext {
    pub aux_collection: MoverDataCollection,
}

// ---------------------------------------------------------------------------
// Tick start / end
// ---------------------------------------------------------------------------

/// Everything a simulation step starts from.
#[derive(Debug, Clone, Default)]
pub struct MoverTickStartData {
    pub input_cmd: MoverInputCmdContext,
    pub sync_state: MoverSyncState,
    pub aux_state: MoverAuxStateContext,
}

/// How the active mode left the step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovementModeEndState {
    /// Mode to activate for the next step, if a change was requested.
    pub next_mode_name: Option<String>,
    /// Part of the step the mode did not consume, in milliseconds.
    pub remaining_ms: f32,
}

/// Everything a simulation step produces.
#[derive(Debug, Clone, Default)]
pub struct MoverTickEndData {
    pub sync_state: MoverSyncState,
    pub aux_state: MoverAuxStateContext,
    pub movement_end_state: MovementModeEndState,
}

impl MoverTickEndData {
    /// End data seeded from `start`, ready for a step to overwrite.
    pub fn from_start(start: &MoverTickStartData) -> Self {
        Self {
            sync_state: start.sync_state.clone(),
            aux_state: start.aux_state.clone(),
            movement_end_state: MovementModeEndState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::default_data::MoverDefaultSyncState;
    use crate::layered_move::builtin::LinearVelocityMove;

    fn sync_at(mode: &str, x: f32) -> MoverSyncState {
        let mut sync = MoverSyncState {
            movement_mode: mode.to_string(),
            ..Default::default()
        };
        sync.sync_state_collection.add(MoverDefaultSyncState {
            location: Vec3::new(x, 0.0, 0.0),
            ..Default::default()
        });
        sync
    }

    #[test]
    fn test_sync_state_wire_round_trip() {
        let registry = MoverTypeRegistry::with_defaults();
        let mut sent = sync_at("Walking", 12.0);
        sent.layered_moves
            .queue_move(Box::new(LinearVelocityMove::default()));

        let mut writer = NetWriter::new();
        sent.net_serialize(&mut writer, SerializeLimits::default())
            .unwrap();
        let bytes = writer.into_bytes();

        let mut received = MoverSyncState::default();
        let mut reader = NetReader::new(&bytes);
        received.net_deserialize(&mut reader, &registry).unwrap();

        assert_eq!(reader.remaining(), 0);
        assert_eq!(received.movement_mode, "Walking");
        assert_eq!(received.layered_moves.queued_moves().len(), 1);
        assert!(!received.should_reconcile(&sent));
    }

    #[test]
    fn test_reconcile_ignores_move_lists() {
        let local = sync_at("Walking", 0.0);
        let mut authority = local.clone();
        authority
            .layered_moves
            .queue_move(Box::new(LinearVelocityMove::default()));
        assert!(!local.should_reconcile(&authority));

        authority.movement_mode = "Falling".into();
        assert!(local.should_reconcile(&authority));
    }

    #[test]
    fn test_interpolate_takes_mode_from_target() {
        let from = sync_at("Walking", 0.0);
        let to = sync_at("Falling", 10.0);
        let mid = MoverSyncState::interpolate(&from, &to, 0.5);
        assert_eq!(mid.movement_mode, "Falling");
        let state = mid
            .sync_state_collection
            .find::<MoverDefaultSyncState>()
            .unwrap();
        assert_eq!(state.location.x, 5.0);
    }

    #[test]
    fn test_time_step_helpers() {
        let ts = MoverTimeStep {
            server_frame: 3,
            base_sim_time_ms: 1000.0,
            step_ms: 16.0,
            is_resimulating: false,
        };
        assert_eq!(ts.end_sim_time_ms(), 1016.0);
        assert!((ts.step_secs() - 0.016).abs() < 1e-6);
    }
}
