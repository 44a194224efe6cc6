//! Built-in data blocks: default character inputs and the default kinematic
//! sync state.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::data_collection::MoverDataStruct;
use crate::net::MoverType;

/// Abstract parent tag of every input block.
pub const INPUT_DATA_TAG: &str = "MoverInputData";

/// Abstract parent tag of every sync-state block.
pub const SYNC_STATE_DATA_TAG: &str = "MoverSyncStateData";

/// Largest location difference (per axis, world units) tolerated before a
/// correction is requested.
pub const LOCATION_TOLERANCE: f32 = 0.01;

/// Largest velocity difference (per axis, units per second) tolerated before
/// a correction is requested.
pub const VELOCITY_TOLERANCE: f32 = 0.01;

/// Largest orientation difference tolerated before a correction is requested.
pub const ORIENTATION_TOLERANCE_DEG: f32 = 0.5;

// ---------------------------------------------------------------------------
// CharacterDefaultInputs
// ---------------------------------------------------------------------------

/// How [`CharacterDefaultInputs::move_input`] is to be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveInputType {
    /// A direction with magnitude in `[0, 1]`.
    #[default]
    DirectionalIntent,
    /// A requested velocity in units per second.
    Velocity,
}

/// The input block produced for a player-controlled character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDefaultInputs {
    /// Interpretation of `move_input`.
    pub move_input_type: MoveInputType,
    /// Movement request, see [`MoveInputType`].
    pub move_input: Vec3,
    /// Direction the character should face. Zero means "no preference".
    pub orientation_intent: Vec3,
    /// Control (camera) rotation at the time the input was sampled.
    pub control_rotation: Quat,
    /// Mode the input source asks the simulation to switch to.
    pub suggested_movement_mode: Option<String>,
    /// Jump was pressed during this input's sampling window.
    pub is_jump_just_pressed: bool,
    /// Jump is held.
    pub is_jump_pressed: bool,
}

impl Default for CharacterDefaultInputs {
    fn default() -> Self {
        Self {
            move_input_type: MoveInputType::DirectionalIntent,
            move_input: Vec3::ZERO,
            orientation_intent: Vec3::ZERO,
            control_rotation: Quat::IDENTITY,
            suggested_movement_mode: None,
            is_jump_just_pressed: false,
            is_jump_pressed: false,
        }
    }
}

impl CharacterDefaultInputs {
    /// Sets the movement request. Directional intent is clamped to unit length.
    pub fn set_move_input(&mut self, input_type: MoveInputType, input: Vec3) {
        self.move_input_type = input_type;
        self.move_input = match input_type {
            MoveInputType::DirectionalIntent => input.clamp_length_max(1.0),
            MoveInputType::Velocity => input,
        };
    }

    /// Directional intent regardless of how the input was expressed.
    pub fn move_input_intent(&self) -> Vec3 {
        match self.move_input_type {
            MoveInputType::DirectionalIntent => self.move_input,
            MoveInputType::Velocity => self.move_input.normalize_or_zero(),
        }
    }

    /// Requested velocity, or zero for directional input.
    pub fn move_input_velocity(&self) -> Vec3 {
        match self.move_input_type {
            MoveInputType::DirectionalIntent => Vec3::ZERO,
            MoveInputType::Velocity => self.move_input,
        }
    }
}

impl MoverType for CharacterDefaultInputs {
    const TAG: &'static str = "CharacterDefaultInputs";
    const PARENTS: &'static [&'static str] = &[INPUT_DATA_TAG];
}

impl MoverDataStruct for CharacterDefaultInputs {
    fn interpolate(&self, to: &dyn MoverDataStruct, pct: f32) -> Box<dyn MoverDataStruct> {
        let Some(to) = to.downcast_ref::<Self>() else {
            return Box::new(self.clone());
        };
        let nearer = if pct < 0.5 { self } else { to };
        Box::new(Self {
            move_input_type: nearer.move_input_type,
            move_input: self.move_input.lerp(to.move_input, pct),
            orientation_intent: self.orientation_intent.lerp(to.orientation_intent, pct),
            control_rotation: self.control_rotation.slerp(to.control_rotation, pct),
            suggested_movement_mode: nearer.suggested_movement_mode.clone(),
            is_jump_just_pressed: nearer.is_jump_just_pressed,
            is_jump_pressed: nearer.is_jump_pressed,
        })
    }

    fn merge(&mut self, from: &dyn MoverDataStruct) {
        if let Some(from) = from.downcast_ref::<Self>() {
            self.is_jump_pressed |= from.is_jump_pressed;
            self.is_jump_just_pressed |= from.is_jump_just_pressed;
        }
    }

    fn decay(&mut self, amount: f32) {
        self.move_input *= 1.0 - amount.clamp(0.0, 1.0);
        // Edge-triggered flags are consumed by the first use.
        if amount > 0.0 {
            self.is_jump_just_pressed = false;
        }
    }
}

// ---------------------------------------------------------------------------
// MoverDefaultSyncState
// ---------------------------------------------------------------------------

/// Kinematic state every mover replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoverDefaultSyncState {
    /// World-space location.
    pub location: Vec3,
    /// World-space orientation.
    pub orientation: Quat,
    /// Linear velocity in units per second.
    pub velocity: Vec3,
    /// Angular velocity as a scaled axis, radians per second.
    pub angular_velocity: Vec3,
    /// Identifier of the object the mover stands on, if any.
    pub movement_base: Option<u64>,
}

impl Default for MoverDefaultSyncState {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            movement_base: None,
        }
    }
}

impl MoverDefaultSyncState {
    /// Sets the full kinematic state at once.
    pub fn set_transforms(
        &mut self,
        location: Vec3,
        orientation: Quat,
        velocity: Vec3,
        movement_base: Option<u64>,
    ) {
        self.location = location;
        self.orientation = orientation;
        self.velocity = velocity;
        self.movement_base = movement_base;
    }

    /// Velocity component along the plane orthogonal to `up`.
    pub fn horizontal_velocity(&self, up: Vec3) -> Vec3 {
        self.velocity - up * self.velocity.dot(up)
    }
}

impl MoverType for MoverDefaultSyncState {
    const TAG: &'static str = "MoverDefaultSyncState";
    const PARENTS: &'static [&'static str] = &[SYNC_STATE_DATA_TAG];
}

impl MoverDataStruct for MoverDefaultSyncState {
    fn interpolate(&self, to: &dyn MoverDataStruct, pct: f32) -> Box<dyn MoverDataStruct> {
        let Some(to) = to.downcast_ref::<Self>() else {
            return Box::new(self.clone());
        };
        Box::new(Self {
            location: self.location.lerp(to.location, pct),
            orientation: self.orientation.slerp(to.orientation, pct),
            velocity: self.velocity.lerp(to.velocity, pct),
            angular_velocity: self.angular_velocity.lerp(to.angular_velocity, pct),
            movement_base: if pct < 0.5 {
                self.movement_base
            } else {
                to.movement_base
            },
        })
    }

    fn should_reconcile(&self, authority: &dyn MoverDataStruct) -> bool {
        let Some(authority) = authority.downcast_ref::<Self>() else {
            return true;
        };
        let orientation_error = self.orientation.angle_between(authority.orientation);
        self.movement_base != authority.movement_base
            || !self.location.abs_diff_eq(authority.location, LOCATION_TOLERANCE)
            || !self.velocity.abs_diff_eq(authority.velocity, VELOCITY_TOLERANCE)
            || !self
                .angular_velocity
                .abs_diff_eq(authority.angular_velocity, VELOCITY_TOLERANCE)
            || orientation_error.to_degrees() > ORIENTATION_TOLERANCE_DEG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_intent_is_clamped() {
        let mut inputs = CharacterDefaultInputs::default();
        inputs.set_move_input(MoveInputType::DirectionalIntent, Vec3::new(3.0, 4.0, 0.0));
        assert!((inputs.move_input.length() - 1.0).abs() < 1e-5);

        inputs.set_move_input(MoveInputType::Velocity, Vec3::new(3.0, 4.0, 0.0));
        assert_eq!(inputs.move_input_velocity(), Vec3::new(3.0, 4.0, 0.0));
        assert!((inputs.move_input_intent().length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_merge_keeps_jump_presses() {
        let mut older = CharacterDefaultInputs::default();
        let newer = CharacterDefaultInputs {
            is_jump_just_pressed: true,
            ..Default::default()
        };
        older.merge(&newer);
        assert!(older.is_jump_just_pressed);
    }

    #[test]
    fn test_decay_consumes_just_pressed() {
        let mut inputs = CharacterDefaultInputs {
            move_input: Vec3::X,
            is_jump_just_pressed: true,
            is_jump_pressed: true,
            ..Default::default()
        };
        inputs.decay(0.5);
        assert_eq!(inputs.move_input, Vec3::X * 0.5);
        assert!(!inputs.is_jump_just_pressed);
        assert!(inputs.is_jump_pressed);
    }

    #[test]
    fn test_sync_state_interpolates_midpoint() {
        let a = MoverDefaultSyncState::default();
        let b = MoverDefaultSyncState {
            location: Vec3::new(10.0, 0.0, 0.0),
            velocity: Vec3::new(0.0, 4.0, 0.0),
            ..Default::default()
        };
        let mid = a.interpolate(&b, 0.5);
        let mid = mid.downcast_ref::<MoverDefaultSyncState>().unwrap();
        assert_eq!(mid.location, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(mid.velocity, Vec3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_reconcile_within_tolerance() {
        let local = MoverDefaultSyncState::default();
        let mut authority = local.clone();
        authority.location.x += LOCATION_TOLERANCE * 0.5;
        assert!(!local.should_reconcile(&authority));

        authority.location.x += 1.0;
        assert!(local.should_reconcile(&authority));
    }

    #[test]
    fn test_reconcile_on_orientation_error() {
        let local = MoverDefaultSyncState::default();
        let authority = MoverDefaultSyncState {
            orientation: Quat::from_rotation_z(10f32.to_radians()),
            ..Default::default()
        };
        assert!(local.should_reconcile(&authority));
    }

    #[test]
    fn test_sync_state_json_view() {
        let state = MoverDefaultSyncState {
            location: Vec3::new(1.0, 2.0, 3.0),
            movement_base: Some(7),
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["location"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(json["orientation"], serde_json::json!([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(json["movement_base"], 7);

        let back: MoverDefaultSyncState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }
}
