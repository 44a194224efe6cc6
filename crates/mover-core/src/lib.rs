//! Deterministic movement simulation: layered moves, movement modifiers,
//! movement modes, replicated state collections and rollback.
//!
//! A [`MoverComponent`] advances one actor frame by frame. A
//! [`StandaloneLiaison`] drives it at a fixed step, keeps the history needed
//! to resimulate after an authoritative correction, and exposes the pending
//! and presentation states through [`MoverBackendLiaison`].

pub mod blackboard;
mod component;
mod data_collection;
mod default_data;
mod environment;
mod error;
mod history;
mod instant_effect;
pub mod layered_move;
mod liaison;
pub mod movement_mode;
pub mod movement_modifier;
mod net;
mod output_record;
mod proposed_move;
mod registry;
mod schedule;
mod types;

pub use blackboard::MoverBlackboard;
pub use component::{
    GameplayRequests, INPUT_REPLAY_FRAMES, MoverComponent, MoverInputProducer, RollbackListener,
};
pub use data_collection::{DataStructClone, MoverDataCollection, MoverDataStruct};
pub use default_data::{
    CharacterDefaultInputs, INPUT_DATA_TAG, LOCATION_TOLERANCE, MoveInputType,
    MoverDefaultSyncState, ORIENTATION_TOLERANCE_DEG, SYNC_STATE_DATA_TAG, VELOCITY_TOLERANCE,
};
pub use environment::{
    FlatFloor, FloorCheckResult, FloorQuery, MovementEnvironment, RootMotionDelta,
    RootMotionSource,
};
pub use error::{LiaisonError, PhaseError};
pub use history::{DEFAULT_HISTORY_FRAMES, FrameHistory, FrameRecord};
pub use instant_effect::{ApplyVelocityEffect, InstantMovementEffect, TeleportEffect};
pub use layered_move::{
    FinishVelocityMode, FinishVelocitySettings, LayeredMove, LayeredMoveBase, LayeredMoveGroup,
    MoveGenerationContext,
};
pub use liaison::{CorrectionOutcome, MoverBackendLiaison, StandaloneLiaison};
pub use movement_mode::{
    KinematicMovementMode, LandedTransition, MovementMode, MovementTransition, NullMovementMode,
    SimulationTickParams, SuggestedModeTransition, TransitionResult,
};
pub use movement_modifier::{
    ModifierHandle, ModifierHandleGenerator, MovementModifier, MovementModifierBase,
    MovementModifierGroup,
};
pub use net::{
    MAX_TAG_LEN, MAX_WIRE_ENTRIES, MoverType, NetPayload, NetReader, NetSerializeError, NetWriter,
};
pub use output_record::{SimulationOutputData, SimulationOutputRecord};
pub use proposed_move::{LayeredMoveMixer, MoveMixMode, ProposedMove};
pub use registry::{MoverTypeRegistry, RegistryError, TypeRegistry};
pub use schedule::{
    MoverActor, MoverFixedStep, MoverThreading, MoverTickSet, PhaseGate, add_mover_systems,
    build_mover_schedule, configure_mover_tick_ordering,
};
pub use types::{
    MovementModeEndState, MoverAuxStateContext, MoverInputCmdContext, MoverSyncState,
    MoverTickEndData, MoverTickStartData, MoverTimeStep, SerializeLimits,
};
