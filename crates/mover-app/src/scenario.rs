//! Scripted gameplay scenario driven through the ECS phase schedule.
//!
//! Each actor is a [`MoverActor`] entity. Between frames the script queues
//! gameplay requests (jumps, launches, modifiers, teleports) and injects
//! authoritative corrections so the rollback path runs as it would under
//! replication.

use std::collections::HashMap;
use std::sync::Arc;

use bevy_ecs::prelude::*;
use glam::Vec3;
use tracing::{info, warn};

use mover_config::Config;
use mover_core::layered_move::builtin::{JumpImpulseMove, LaunchMove};
use mover_core::movement_mode::mode_names;
use mover_core::movement_modifier::builtin::SpeedScaleModifier;
use mover_core::{
    CharacterDefaultInputs, CorrectionOutcome, FlatFloor, KinematicMovementMode,
    LandedTransition, LayeredMoveBase, ModifierHandle, MoveInputType, MoveMixMode,
    MovementEnvironment, MovementModifierBase, MoverActor, MoverBackendLiaison,
    MoverComponent, MoverDefaultSyncState, MoverFixedStep, MoverInputCmdContext, MoverSyncState,
    MoverThreading, MoverTypeRegistry, NullMovementMode, SerializeLimits, StandaloneLiaison,
    SuggestedModeTransition, TeleportEffect, build_mover_schedule,
};

/// Display name of an actor.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct ActorName(pub String);

/// How an actor is spawned.
#[derive(Debug, Clone)]
pub struct ActorSetup {
    pub name: String,
    pub start_location: Vec3,
    /// Walking direction. The actor turns around every `patrol_frames`.
    pub direction: Vec3,
    /// `0` walks in one direction forever.
    pub patrol_frames: u32,
    pub max_speed: f32,
}

/// A gameplay request issued between frames.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedEvent {
    Jump { upwards_speed: f32 },
    Launch { velocity: Vec3, duration_ms: f32 },
    SlowDown { scale: f32 },
    EndSlowDown,
    Teleport { location: Vec3 },
    /// Pretends the authority saw the actor `offset` away from the local
    /// prediction `frames_back` frames ago.
    Correction { frames_back: i32, offset: Vec3 },
}

/// An event bound to an actor and the frame it is issued before.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedAction {
    pub frame: i32,
    pub actor: String,
    pub event: ScriptedEvent,
}

impl ScriptedAction {
    pub fn new(frame: i32, actor: &str, event: ScriptedEvent) -> Self {
        Self {
            frame,
            actor: actor.to_string(),
            event,
        }
    }
}

/// Presentation view of one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSnapshot {
    pub name: String,
    pub frame: i32,
    pub mode: String,
    pub location: Vec3,
    pub velocity: Vec3,
}

// ---------------------------------------------------------------------------
// Actor construction
// ---------------------------------------------------------------------------

/// Builds and initializes a walking mover from `setup`.
pub fn build_mover(
    registry: Arc<MoverTypeRegistry>,
    config: &Config,
    setup: &ActorSetup,
) -> MoverComponent {
    let mut component = MoverComponent::new(registry);

    let mut walking = KinematicMovementMode::new(setup.max_speed);
    walking.airborne_mode = Some(mode_names::FALLING.to_string());
    let falling = KinematicMovementMode::new(setup.max_speed)
        .with_transition(Box::new(LandedTransition::new(mode_names::WALKING)));
    component.register_mode(mode_names::WALKING, Box::new(walking));
    component.register_mode(mode_names::FALLING, Box::new(falling));
    component.register_mode(mode_names::NULL, Box::new(NullMovementMode));
    component.set_starting_mode(&config.simulation.starting_movement_mode);
    component.add_global_transition(Box::new(SuggestedModeTransition));

    component.set_environment(MovementEnvironment {
        floor_query: Some(Arc::new(FlatFloor { height: 0.0 })),
        ..Default::default()
    });
    component.set_serialize_limits(SerializeLimits {
        max_layered_moves: config.network.max_layered_moves_to_serialize,
        max_modifiers: config.network.max_modifiers_to_serialize,
    });

    let direction = setup.direction.normalize_or_zero();
    let patrol_frames = setup.patrol_frames;
    let mut produced = 0u32;
    component.set_input_producer(Box::new(
        move |_step_ms: f32, cmd: &mut MoverInputCmdContext| {
            let leg = produced.checked_div(patrol_frames).unwrap_or(0);
            let heading = if leg % 2 == 0 { direction } else { -direction };
            produced = produced.wrapping_add(1);
            cmd.input_collection
                .find_or_add_mut::<CharacterDefaultInputs>()
                .set_move_input(MoveInputType::DirectionalIntent, heading);
        },
    ));

    let mut initial = MoverSyncState::default();
    initial
        .sync_state_collection
        .find_or_add_mut::<MoverDefaultSyncState>()
        .location = setup.start_location;
    component.initialize(initial);
    component
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// A world of movers advanced one frame per [`Scenario::step`].
pub struct Scenario {
    world: World,
    schedule: Schedule,
    script: Vec<ScriptedAction>,
    slowdowns: HashMap<Entity, ModifierHandle>,
}

impl Scenario {
    pub fn new(config: &Config, actors: &[ActorSetup], script: Vec<ScriptedAction>) -> Self {
        let registry = Arc::new(MoverTypeRegistry::with_defaults());
        let mut world = World::new();
        world.insert_resource(MoverThreading {
            allow_async_phases: config.threading.allow_async_phases,
            async_produce_input: config.threading.async_produce_input,
            async_simulate: config.threading.async_simulate,
            async_apply: config.threading.async_apply,
        });
        world.insert_resource(MoverFixedStep {
            step_ms: config.simulation.fixed_step_ms,
        });

        for setup in actors {
            let component = build_mover(Arc::clone(&registry), config, setup);
            let liaison = StandaloneLiaison::new(component, config.simulation.history_frames);
            world.spawn((ActorName(setup.name.clone()), MoverActor { liaison }));
        }
        info!(actors = actors.len(), "scenario spawned");

        Self {
            world,
            schedule: build_mover_schedule(),
            script,
            slowdowns: HashMap::new(),
        }
    }

    /// Two patrolling actors with a script that exercises every gameplay
    /// request and two corrections.
    pub fn demo(config: &Config) -> Self {
        let actors = [
            ActorSetup {
                name: "runner".to_string(),
                start_location: Vec3::ZERO,
                direction: Vec3::X,
                patrol_frames: 0,
                max_speed: 6.0,
            },
            ActorSetup {
                name: "patrol".to_string(),
                start_location: Vec3::new(0.0, 10.0, 0.0),
                direction: Vec3::Y,
                patrol_frames: 90,
                max_speed: 4.0,
            },
        ];
        let script = vec![
            ScriptedAction::new(20, "runner", ScriptedEvent::Jump { upwards_speed: 5.0 }),
            ScriptedAction::new(40, "patrol", ScriptedEvent::SlowDown { scale: 0.5 }),
            ScriptedAction::new(
                60,
                "runner",
                ScriptedEvent::Launch {
                    velocity: Vec3::new(0.0, 3.0, 0.0),
                    duration_ms: 250.0,
                },
            ),
            ScriptedAction::new(
                80,
                "runner",
                ScriptedEvent::Correction {
                    frames_back: 6,
                    offset: Vec3::new(0.5, 0.0, 0.0),
                },
            ),
            ScriptedAction::new(100, "patrol", ScriptedEvent::EndSlowDown),
            ScriptedAction::new(
                120,
                "runner",
                ScriptedEvent::Teleport {
                    location: Vec3::new(0.0, -5.0, 0.0),
                },
            ),
            ScriptedAction::new(
                140,
                "patrol",
                ScriptedEvent::Correction {
                    frames_back: 10,
                    offset: Vec3::ZERO,
                },
            ),
        ];
        Self::new(config, &actors, script)
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Issues the script events due this frame and advances every actor.
    pub fn step(&mut self, step_ms: f32) {
        self.world.resource_mut::<MoverFixedStep>().step_ms = step_ms;
        self.issue_due_events();
        self.schedule.run(&mut self.world);
    }

    /// Presentation state of every actor, blended `alpha` of the way from the
    /// previous committed frame to the latest one.
    pub fn snapshots(&mut self, alpha: f32) -> Vec<ActorSnapshot> {
        let mut query = self.world.query::<(&ActorName, &MoverActor)>();
        let mut snapshots: Vec<ActorSnapshot> = query
            .iter(&self.world)
            .filter_map(|(name, actor)| snapshot(name, &actor.liaison, alpha))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    fn issue_due_events(&mut self) {
        let mut query = self
            .world
            .query::<(Entity, &ActorName, &mut MoverActor)>();
        for (entity, name, mut actor) in query.iter_mut(&mut self.world) {
            let frame = actor.liaison.current_sim_frame();
            for action in self
                .script
                .iter()
                .filter(|a| a.frame == frame && a.actor == name.0)
            {
                issue(
                    entity,
                    &name.0,
                    &mut actor.liaison,
                    &action.event,
                    &mut self.slowdowns,
                );
            }
        }
    }
}

fn snapshot(name: &ActorName, liaison: &StandaloneLiaison, alpha: f32) -> Option<ActorSnapshot> {
    let current = liaison.read_presentation_sync_state()?;
    let blended = match liaison.read_prev_presentation_sync_state() {
        Some(previous) => MoverSyncState::interpolate(&previous, &current, alpha),
        None => current,
    };
    let state = blended
        .sync_state_collection
        .find::<MoverDefaultSyncState>()?;
    Some(ActorSnapshot {
        name: name.0.clone(),
        frame: liaison.current_sim_frame(),
        mode: blended.movement_mode.clone(),
        location: state.location,
        velocity: state.velocity,
    })
}

fn issue(
    entity: Entity,
    actor: &str,
    liaison: &mut StandaloneLiaison,
    event: &ScriptedEvent,
    slowdowns: &mut HashMap<Entity, ModifierHandle>,
) {
    let frame = liaison.current_sim_frame();
    info!(actor, frame, ?event, "scripted event");
    match event {
        ScriptedEvent::Jump { upwards_speed } => {
            liaison
                .component_mut()
                .queue_layered_move(Box::new(JumpImpulseMove {
                    upwards_speed: *upwards_speed,
                    airborne_mode: Some(mode_names::FALLING.to_string()),
                    ..Default::default()
                }));
        }
        ScriptedEvent::Launch {
            velocity,
            duration_ms,
        } => {
            liaison.component_mut().queue_layered_move(Box::new(LaunchMove {
                base: LayeredMoveBase::new(MoveMixMode::AdditiveVelocity, *duration_ms),
                launch_velocity: *velocity,
                force_movement_mode: None,
            }));
        }
        ScriptedEvent::SlowDown { scale } => {
            let handle = liaison
                .component_mut()
                .queue_movement_modifier(Box::new(SpeedScaleModifier {
                    base: MovementModifierBase::default(),
                    scale: *scale,
                }));
            if let Some(previous) = slowdowns.insert(entity, handle) {
                liaison.component_mut().cancel_modifier_from_handle(previous);
            }
        }
        ScriptedEvent::EndSlowDown => match slowdowns.remove(&entity) {
            Some(handle) => liaison.component_mut().cancel_modifier_from_handle(handle),
            None => warn!(actor, "no slowdown to end"),
        },
        ScriptedEvent::Teleport { location } => {
            liaison
                .component_mut()
                .queue_instant_effect(Box::new(TeleportEffect {
                    target_location: *location,
                    target_orientation: None,
                    keep_velocity: false,
                }));
        }
        ScriptedEvent::Correction {
            frames_back,
            offset,
        } => correct(actor, liaison, frame - frames_back, *offset),
    }
}

fn correct(actor: &str, liaison: &mut StandaloneLiaison, frame: i32, offset: Vec3) {
    let Some(record) = liaison.history().get(frame) else {
        warn!(actor, frame, "correction target is outside the history");
        return;
    };
    let mut authority = record.sync_state.clone();
    if let Some(state) = authority
        .sync_state_collection
        .find_mut::<MoverDefaultSyncState>()
    {
        state.location += offset;
    }
    match liaison.apply_authoritative_correction(frame, authority, None) {
        Ok(CorrectionOutcome::NoCorrection) => info!(actor, frame, "prediction confirmed"),
        Ok(CorrectionOutcome::Resimulated { frames }) => {
            info!(actor, frame, frames, "prediction corrected")
        }
        Err(err) => warn!(actor, frame, %err, "correction rejected"),
    }
}
