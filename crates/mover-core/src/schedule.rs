//! Tick phases and their ordering.
//!
//! Every frame runs three phases per mover: input is produced, the movement
//! is simulated, then the result is applied. [`MoverTickSet`] names them for
//! a bevy_ecs [`Schedule`]; [`PhaseGate`] enforces the same order for a
//! driver that calls the phases by hand.
//!
//! Phases may run actors in parallel when [`MoverThreading`] allows it.
//! Within one actor the phases never overlap.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::Schedule;
use tracing::warn;

use crate::error::{LiaisonError, PhaseError};
use crate::liaison::StandaloneLiaison;

/// The three phases of a mover frame.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoverTickSet {
    /// Produce or replay the input for the frame.
    ProduceInput,
    /// Run the simulation step.
    SimulateMovement,
    /// Publish the step's result.
    ApplyState,
}

impl MoverTickSet {
    /// Phase that follows `self`, wrapping to the next frame.
    pub fn next(self) -> Self {
        match self {
            Self::ProduceInput => Self::SimulateMovement,
            Self::SimulateMovement => Self::ApplyState,
            Self::ApplyState => Self::ProduceInput,
        }
    }
}

/// Configure ordering constraints for the mover phases.
pub fn configure_mover_tick_ordering(schedule: &mut Schedule) {
    schedule.configure_sets((
        MoverTickSet::ProduceInput.before(MoverTickSet::SimulateMovement),
        MoverTickSet::SimulateMovement.before(MoverTickSet::ApplyState),
    ));
}

// ---------------------------------------------------------------------------
// PhaseGate
// ---------------------------------------------------------------------------

/// Rejects phases run out of order for one actor.
#[derive(Debug, Clone)]
pub struct PhaseGate {
    expected: MoverTickSet,
}

impl Default for PhaseGate {
    fn default() -> Self {
        Self {
            expected: MoverTickSet::ProduceInput,
        }
    }
}

impl PhaseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase that may run next.
    pub fn expected(&self) -> MoverTickSet {
        self.expected
    }

    /// Marks `phase` as started. Fails without changing state if it is not
    /// the expected one.
    pub fn enter(&mut self, phase: MoverTickSet) -> Result<(), PhaseError> {
        if phase != self.expected {
            warn!(expected = ?self.expected, found = ?phase, "tick phase out of order");
            return Err(PhaseError::OutOfOrder {
                expected: self.expected,
                found: phase,
            });
        }
        self.expected = phase.next();
        Ok(())
    }

    /// Restarts at [`MoverTickSet::ProduceInput`].
    pub fn reset(&mut self) {
        self.expected = MoverTickSet::ProduceInput;
    }
}

// ---------------------------------------------------------------------------
// ECS integration
// ---------------------------------------------------------------------------

/// A simulated mover living in an ECS world.
#[derive(Component, Debug)]
pub struct MoverActor {
    pub liaison: StandaloneLiaison,
}

/// Which phases may spread actors across worker threads.
#[derive(Resource, Debug, Clone, Default)]
pub struct MoverThreading {
    /// Global capability flag. Per-phase flags are ignored while unset.
    pub allow_async_phases: bool,
    pub async_produce_input: bool,
    pub async_simulate: bool,
    pub async_apply: bool,
}

impl MoverThreading {
    /// Whether `phase` iterates actors in parallel.
    pub fn runs_async(&self, phase: MoverTickSet) -> bool {
        self.allow_async_phases
            && match phase {
                MoverTickSet::ProduceInput => self.async_produce_input,
                MoverTickSet::SimulateMovement => self.async_simulate,
                MoverTickSet::ApplyState => self.async_apply,
            }
    }
}

/// Fixed step length used by the phase systems.
#[derive(Resource, Debug, Clone, Copy)]
pub struct MoverFixedStep {
    pub step_ms: f32,
}

impl Default for MoverFixedStep {
    fn default() -> Self {
        Self {
            step_ms: 1000.0 / 60.0,
        }
    }
}

fn report(entity: Entity, result: Result<(), LiaisonError>) {
    if let Err(err) = result {
        warn!(?entity, %err, "mover phase skipped");
    }
}

fn produce_input_system(
    threading: Res<MoverThreading>,
    step: Res<MoverFixedStep>,
    mut movers: Query<(Entity, &mut MoverActor)>,
) {
    let step_ms = step.step_ms;
    let run = move |(entity, mut actor): (Entity, Mut<'_, MoverActor>)| {
        report(entity, actor.liaison.produce_input_phase(step_ms));
    };
    if threading.runs_async(MoverTickSet::ProduceInput) {
        movers.par_iter_mut().for_each(run);
    } else {
        movers.iter_mut().for_each(run);
    }
}

fn simulate_movement_system(
    threading: Res<MoverThreading>,
    mut movers: Query<(Entity, &mut MoverActor)>,
) {
    let run = |(entity, mut actor): (Entity, Mut<'_, MoverActor>)| {
        report(entity, actor.liaison.simulate_phase());
    };
    if threading.runs_async(MoverTickSet::SimulateMovement) {
        movers.par_iter_mut().for_each(run);
    } else {
        movers.iter_mut().for_each(run);
    }
}

fn apply_state_system(
    threading: Res<MoverThreading>,
    mut movers: Query<(Entity, &mut MoverActor)>,
) {
    let run = |(entity, mut actor): (Entity, Mut<'_, MoverActor>)| {
        report(entity, actor.liaison.apply_state_phase());
    };
    if threading.runs_async(MoverTickSet::ApplyState) {
        movers.par_iter_mut().for_each(run);
    } else {
        movers.iter_mut().for_each(run);
    }
}

/// Adds the three phase systems, ordered, to `schedule`.
pub fn add_mover_systems(schedule: &mut Schedule) {
    configure_mover_tick_ordering(schedule);
    schedule.add_systems((
        produce_input_system.in_set(MoverTickSet::ProduceInput),
        simulate_movement_system.in_set(MoverTickSet::SimulateMovement),
        apply_state_system.in_set(MoverTickSet::ApplyState),
    ));
}

/// A schedule that advances every [`MoverActor`] by one frame per run.
///
/// The world needs [`MoverThreading`] and [`MoverFixedStep`] resources.
pub fn build_mover_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    add_mover_systems(&mut schedule);
    schedule
}
