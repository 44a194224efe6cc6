//! Movement modes and the transitions between them.
//!
//! A mode turns the composed proposed move into a new sync state. Modes take
//! `&self` everywhere: anything a mode needs to remember across ticks must
//! live in the sync state, the aux state or the blackboard, so rollback can
//! restore it.

use std::fmt::Debug;

use glam::{Quat, Vec3};
use tracing::trace;

use crate::blackboard::{MoverBlackboard, keys};
use crate::default_data::{CharacterDefaultInputs, MoveInputType, MoverDefaultSyncState};
use crate::environment::{FloorCheckResult, MovementEnvironment};
use crate::proposed_move::{MoveMixMode, ProposedMove};
use crate::types::{MoverTickEndData, MoverTickStartData, MoverTimeStep};

/// Names of the modes the engine ships with.
pub mod mode_names {
    pub const WALKING: &str = "Walking";
    pub const FALLING: &str = "Falling";
    pub const NULL: &str = "Null";
}

/// Inputs to [`MovementMode::simulation_tick`].
#[derive(Debug, Clone, Copy)]
pub struct SimulationTickParams<'a> {
    pub time_step: &'a MoverTimeStep,
    pub start_state: &'a MoverTickStartData,
    /// Mode proposal combined with layered moves and modifiers.
    pub proposed_move: &'a ProposedMove,
    pub environment: &'a MovementEnvironment,
}

/// Integrates motion for one kind of movement.
pub trait MovementMode: Send + Sync + Debug {
    /// Proposes this tick's move from the start state and input.
    fn generate_move(
        &self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        environment: &MovementEnvironment,
        blackboard: &MoverBlackboard,
    ) -> ProposedMove;

    /// Integrates `params.proposed_move` and writes the result to `output`.
    fn simulation_tick(
        &self,
        params: &SimulationTickParams<'_>,
        blackboard: &mut MoverBlackboard,
        output: &mut MoverTickEndData,
    );

    fn on_activated(&self, _blackboard: &mut MoverBlackboard) {}

    fn on_deactivated(&self, _blackboard: &mut MoverBlackboard) {}

    /// Transitions owned by this mode. Evaluated before global transitions.
    fn transitions(&self) -> &[Box<dyn MovementTransition>] {
        &[]
    }
}

/// Outcome of a transition that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    pub next_mode: String,
    /// Switch before this tick integrates instead of at the next tick.
    pub immediate: bool,
}

/// A condition that moves the simulation to another mode.
pub trait MovementTransition: Send + Sync + Debug {
    fn evaluate(
        &self,
        start_state: &MoverTickStartData,
        time_step: &MoverTimeStep,
        blackboard: &MoverBlackboard,
    ) -> Option<TransitionResult>;

    /// Lower values are evaluated first.
    fn eval_order(&self) -> i32 {
        0
    }
}

/// Follows the mode suggested by [`CharacterDefaultInputs`].
#[derive(Debug, Default)]
pub struct SuggestedModeTransition;

impl MovementTransition for SuggestedModeTransition {
    fn evaluate(
        &self,
        start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        _blackboard: &MoverBlackboard,
    ) -> Option<TransitionResult> {
        let inputs = start_state
            .input_cmd
            .input_collection
            .find::<CharacterDefaultInputs>()?;
        let suggested = inputs.suggested_movement_mode.as_deref()?;
        if suggested == start_state.sync_state.movement_mode {
            return None;
        }
        Some(TransitionResult {
            next_mode: suggested.to_string(),
            immediate: false,
        })
    }

    fn eval_order(&self) -> i32 {
        100
    }
}

/// Returns an airborne mover to a grounded mode once the last floor probe
/// found walkable ground and vertical motion has stopped.
#[derive(Debug, Clone)]
pub struct LandedTransition {
    pub grounded_mode: String,
    pub up_direction: Vec3,
}

impl LandedTransition {
    pub fn new(grounded_mode: &str) -> Self {
        Self {
            grounded_mode: grounded_mode.to_string(),
            up_direction: Vec3::Z,
        }
    }
}

impl MovementTransition for LandedTransition {
    fn evaluate(
        &self,
        start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        blackboard: &MoverBlackboard,
    ) -> Option<TransitionResult> {
        let floor = blackboard.get::<FloorCheckResult>(keys::LAST_FLOOR_RESULT)?;
        if !floor.is_walkable_floor() {
            return None;
        }
        let state = start_state
            .sync_state
            .sync_state_collection
            .find::<MoverDefaultSyncState>()?;
        if state.velocity.dot(self.up_direction).abs() > f32::EPSILON {
            return None;
        }
        Some(TransitionResult {
            next_mode: self.grounded_mode.clone(),
            immediate: true,
        })
    }
}

// ---------------------------------------------------------------------------
// NullMovementMode
// ---------------------------------------------------------------------------

/// Holds the mover still.
#[derive(Debug, Default)]
pub struct NullMovementMode;

impl MovementMode for NullMovementMode {
    fn generate_move(
        &self,
        _start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        _environment: &MovementEnvironment,
        _blackboard: &MoverBlackboard,
    ) -> ProposedMove {
        ProposedMove::from_velocity(Vec3::ZERO, MoveMixMode::OverrideAll)
    }

    fn simulation_tick(
        &self,
        _params: &SimulationTickParams<'_>,
        _blackboard: &mut MoverBlackboard,
        output: &mut MoverTickEndData,
    ) {
        let state = output
            .sync_state
            .sync_state_collection
            .find_or_add_mut::<MoverDefaultSyncState>();
        state.velocity = Vec3::ZERO;
        state.angular_velocity = Vec3::ZERO;
    }
}

// ---------------------------------------------------------------------------
// KinematicMovementMode
// ---------------------------------------------------------------------------

/// Direct kinematic movement with gravity and floor snapping.
#[derive(Debug)]
pub struct KinematicMovementMode {
    /// Horizontal speed at full input.
    pub max_speed: f32,
    /// Downward acceleration while airborne, units per second squared.
    pub gravity: f32,
    /// How far below the mover a floor is searched for.
    pub floor_probe_distance: f32,
    /// Mode to report when the mover is airborne. `None` stays in this mode.
    pub airborne_mode: Option<String>,
    transitions: Vec<Box<dyn MovementTransition>>,
}

impl Default for KinematicMovementMode {
    fn default() -> Self {
        Self {
            max_speed: 6.0,
            gravity: 9.81,
            floor_probe_distance: 0.1,
            airborne_mode: None,
            transitions: Vec::new(),
        }
    }
}

impl KinematicMovementMode {
    pub fn new(max_speed: f32) -> Self {
        Self {
            max_speed,
            ..Default::default()
        }
    }

    /// Adds a transition owned by this mode.
    pub fn with_transition(mut self, transition: Box<dyn MovementTransition>) -> Self {
        self.transitions.push(transition);
        self.transitions.sort_by_key(|t| t.eval_order());
        self
    }
}

impl MovementMode for KinematicMovementMode {
    fn generate_move(
        &self,
        start_state: &MoverTickStartData,
        _time_step: &MoverTimeStep,
        environment: &MovementEnvironment,
        _blackboard: &MoverBlackboard,
    ) -> ProposedMove {
        let up = environment.up_direction;
        let current = start_state
            .sync_state
            .sync_state_collection
            .find::<MoverDefaultSyncState>();
        let vertical = current.map_or(Vec3::ZERO, |s| up * s.velocity.dot(up));

        let (intent, desired) = match start_state
            .input_cmd
            .input_collection
            .find::<CharacterDefaultInputs>()
        {
            Some(inputs) => {
                let desired = match inputs.move_input_type {
                    MoveInputType::DirectionalIntent => inputs.move_input * self.max_speed,
                    MoveInputType::Velocity => {
                        inputs.move_input.clamp_length_max(self.max_speed)
                    }
                };
                (inputs.move_input_intent(), desired)
            }
            None => (Vec3::ZERO, Vec3::ZERO),
        };
        let horizontal = desired - up * desired.dot(up);

        ProposedMove {
            direction_intent: Some(intent),
            linear_velocity: horizontal + vertical,
            angular_velocity: Vec3::ZERO,
            mix_mode: MoveMixMode::OverrideAll,
            preferred_mode: None,
        }
    }

    fn simulation_tick(
        &self,
        params: &SimulationTickParams<'_>,
        blackboard: &mut MoverBlackboard,
        output: &mut MoverTickEndData,
    ) {
        let up = params.environment.up_direction;
        let dt = params.time_step.step_secs();
        let start = params
            .start_state
            .sync_state
            .sync_state_collection
            .find::<MoverDefaultSyncState>()
            .cloned()
            .unwrap_or_default();

        let was_on_floor = params
            .environment
            .find_floor(start.location, self.floor_probe_distance)
            .is_walkable_floor();

        let mut velocity = params.proposed_move.linear_velocity;
        let rising = velocity.dot(up) > 0.0;
        if !was_on_floor || rising {
            velocity -= up * self.gravity * dt;
        }

        let mut location = start.location + velocity * dt;
        let floor = params
            .environment
            .find_floor(location, self.floor_probe_distance);
        let landed = floor.is_walkable_floor() && velocity.dot(up) <= 0.0;
        if landed {
            location -= up * floor.floor_distance;
            velocity -= up * velocity.dot(up);
        }
        blackboard.set(keys::LAST_FLOOR_RESULT, floor);

        let angular_velocity = params.proposed_move.angular_velocity;
        let orientation =
            (Quat::from_scaled_axis(angular_velocity * dt) * start.orientation).normalize();

        trace!(
            ?location,
            ?velocity,
            on_floor = landed,
            "kinematic step integrated"
        );

        let state = output
            .sync_state
            .sync_state_collection
            .find_or_add_mut::<MoverDefaultSyncState>();
        state.location = location;
        state.velocity = velocity;
        state.orientation = orientation;
        state.angular_velocity = angular_velocity;

        if !landed && let Some(airborne) = &self.airborne_mode {
            output.movement_end_state.next_mode_name = Some(airborne.clone());
        }
    }

    fn transitions(&self) -> &[Box<dyn MovementTransition>] {
        &self.transitions
    }
}
