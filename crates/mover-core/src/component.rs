//! The per-actor movement orchestrator.
//!
//! [`MoverComponent`] owns the mode map, the gameplay queues and the cached
//! committed state. Each frame a driver asks it to produce input, takes the
//! pending gameplay requests, builds the start data and runs
//! [`MoverComponent::simulation_tick`], which resolves the mode, composes
//! layered moves and modifiers, integrates and commits.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, trace, warn};

use crate::blackboard::{MoverBlackboard, keys};
use crate::default_data::MoverDefaultSyncState;
use crate::environment::MovementEnvironment;
use crate::instant_effect::InstantMovementEffect;
use crate::layered_move::{LayeredMove, MoveGenerationContext};
use crate::movement_mode::{
    MovementMode, MovementTransition, SimulationTickParams, TransitionResult,
};
use crate::movement_modifier::{ModifierHandle, ModifierHandleGenerator, MovementModifier};
use crate::proposed_move::LayeredMoveMixer;
use crate::registry::MoverTypeRegistry;
use crate::types::{
    MoverAuxStateContext, MoverInputCmdContext, MoverSyncState, MoverTickEndData,
    MoverTickStartData, MoverTimeStep, SerializeLimits,
};

/// Number of fresh inputs [`MoverComponent::produce_input`] keeps for replay.
pub const INPUT_REPLAY_FRAMES: usize = 128;

/// Fills the input command for a new frame.
pub trait MoverInputProducer: Send + Sync {
    fn produce_input(&mut self, step_ms: f32, input_cmd: &mut MoverInputCmdContext);
}

impl<F> MoverInputProducer for F
where
    F: FnMut(f32, &mut MoverInputCmdContext) + Send + Sync,
{
    fn produce_input(&mut self, step_ms: f32, input_cmd: &mut MoverInputCmdContext) {
        self(step_ms, input_cmd)
    }
}

/// Notified around a rollback with the state being thrown away and the
/// state replacing it.
pub trait RollbackListener: Send + Sync {
    fn on_pre_rollback(&mut self, _invalid: &MoverSyncState, _corrected: &MoverSyncState) {}

    fn on_post_rollback(&mut self, _invalid: &MoverSyncState, _corrected: &MoverSyncState) {}
}

/// Gameplay requests made between two frames.
///
/// They are folded into a frame's start state by
/// [`MoverComponent::build_tick_start`] and kept with the frame so a
/// resimulation applies them again.
#[derive(Debug, Clone, Default)]
pub struct GameplayRequests {
    pub layered_moves: Vec<Box<dyn LayeredMove>>,
    pub modifiers: Vec<Box<dyn MovementModifier>>,
    pub cancelled_modifiers: Vec<ModifierHandle>,
    pub instant_effects: Vec<Arc<dyn InstantMovementEffect>>,
    pub next_mode: Option<String>,
}

impl GameplayRequests {
    pub fn is_empty(&self) -> bool {
        self.layered_moves.is_empty()
            && self.modifiers.is_empty()
            && self.cancelled_modifiers.is_empty()
            && self.instant_effects.is_empty()
            && self.next_mode.is_none()
    }
}

#[derive(Debug, Default)]
struct CachedState {
    sync_state: MoverSyncState,
    aux_state: MoverAuxStateContext,
}

/// Drives the movement simulation of one actor.
pub struct MoverComponent {
    registry: Arc<MoverTypeRegistry>,
    modes: HashMap<String, Box<dyn MovementMode>>,
    starting_mode: String,
    /// Sorted by evaluation order.
    global_transitions: Vec<Box<dyn MovementTransition>>,
    input_producer: Option<Box<dyn MoverInputProducer>>,
    environment: MovementEnvironment,
    blackboard: MoverBlackboard,
    handle_generator: ModifierHandleGenerator,
    serialize_limits: SerializeLimits,
    /// Requests for the next fresh frame.
    requests: GameplayRequests,

    /// Last committed state. Read by the liaison while the simulation runs.
    cached: RwLock<CachedState>,
    active_mode: Option<String>,
    rollback_listeners: Vec<Box<dyn RollbackListener>>,
    tick_enabled: bool,
    last_input_cmd: MoverInputCmdContext,
    /// Fresh inputs of the most recent frames, oldest first.
    recent_inputs: VecDeque<(i32, MoverInputCmdContext)>,
}

impl fmt::Debug for MoverComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modes: Vec<&String> = self.modes.keys().collect();
        modes.sort();
        f.debug_struct("MoverComponent")
            .field("modes", &modes)
            .field("starting_mode", &self.starting_mode)
            .field("active_mode", &self.active_mode)
            .field("tick_enabled", &self.tick_enabled)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl MoverComponent {
    pub fn new(registry: Arc<MoverTypeRegistry>) -> Self {
        Self {
            registry,
            modes: HashMap::new(),
            starting_mode: String::new(),
            global_transitions: Vec::new(),
            input_producer: None,
            environment: MovementEnvironment::default(),
            blackboard: MoverBlackboard::new(),
            handle_generator: ModifierHandleGenerator::new(),
            serialize_limits: SerializeLimits::default(),
            requests: GameplayRequests::default(),
            cached: RwLock::new(CachedState::default()),
            active_mode: None,
            rollback_listeners: Vec::new(),
            tick_enabled: true,
            last_input_cmd: MoverInputCmdContext::default(),
            recent_inputs: VecDeque::with_capacity(INPUT_REPLAY_FRAMES),
        }
    }

    // -- Setup -------------------------------------------------------------

    /// Registers `mode` under `name`, replacing any mode of that name.
    pub fn register_mode(&mut self, name: &str, mode: Box<dyn MovementMode>) {
        if self.modes.insert(name.to_string(), mode).is_some() {
            debug!(mode = name, "movement mode replaced");
        }
    }

    /// Mode used when the sync state names none.
    pub fn set_starting_mode(&mut self, name: &str) {
        self.starting_mode = name.to_string();
    }

    /// Adds a transition evaluated for every mode, after the mode's own.
    pub fn add_global_transition(&mut self, transition: Box<dyn MovementTransition>) {
        self.global_transitions.push(transition);
        self.global_transitions.sort_by_key(|t| t.eval_order());
    }

    pub fn set_input_producer(&mut self, producer: Box<dyn MoverInputProducer>) {
        self.input_producer = Some(producer);
    }

    pub fn set_environment(&mut self, environment: MovementEnvironment) {
        self.environment = environment;
    }

    pub fn set_serialize_limits(&mut self, limits: SerializeLimits) {
        self.serialize_limits = limits;
    }

    pub fn add_rollback_listener(&mut self, listener: Box<dyn RollbackListener>) {
        self.rollback_listeners.push(listener);
    }

    /// Seeds the committed state and re-enables ticking.
    ///
    /// An empty mode name is replaced by the starting mode.
    pub fn initialize(&mut self, mut initial: MoverSyncState) {
        if initial.movement_mode.is_empty() {
            initial.movement_mode.clone_from(&self.starting_mode);
        }
        initial
            .sync_state_collection
            .find_or_add_mut::<MoverDefaultSyncState>();
        info!(mode = %initial.movement_mode, "mover initialized");
        self.finalize_frame(&initial, &MoverAuxStateContext::default());
        self.active_mode = None;
        self.tick_enabled = true;
    }

    // -- Accessors ---------------------------------------------------------

    pub fn registry(&self) -> &Arc<MoverTypeRegistry> {
        &self.registry
    }

    pub fn environment(&self) -> &MovementEnvironment {
        &self.environment
    }

    pub fn blackboard(&self) -> &MoverBlackboard {
        &self.blackboard
    }

    pub fn serialize_limits(&self) -> SerializeLimits {
        self.serialize_limits
    }

    /// Name of the mode that ran last, after remapping.
    pub fn active_mode_name(&self) -> Option<&str> {
        self.active_mode.as_deref()
    }

    pub fn is_tick_enabled(&self) -> bool {
        self.tick_enabled
    }

    /// Input consumed by the most recent fresh frame.
    pub fn last_input_cmd(&self) -> &MoverInputCmdContext {
        &self.last_input_cmd
    }

    /// Copy of the last committed sync state.
    pub fn cached_sync_state(&self) -> MoverSyncState {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sync_state
            .clone()
    }

    /// Copy of the last committed aux state.
    pub fn cached_aux_state(&self) -> MoverAuxStateContext {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .aux_state
            .clone()
    }

    // -- Gameplay API ------------------------------------------------------

    /// Queues a layered move for the next frame.
    pub fn queue_layered_move(&mut self, layered_move: Box<dyn LayeredMove>) {
        trace!(layered_move = %layered_move.describe(), "gameplay queued layered move");
        self.requests.layered_moves.push(layered_move);
    }

    /// Queues a modifier for the next frame and returns its handle.
    pub fn queue_movement_modifier(
        &mut self,
        mut modifier: Box<dyn MovementModifier>,
    ) -> ModifierHandle {
        let handle = self.handle_generator.generate();
        modifier.base_mut().handle = handle;
        trace!(modifier = %modifier.describe(), "gameplay queued movement modifier");
        self.requests.modifiers.push(modifier);
        handle
    }

    /// Cancels the modifier with `handle` at the next frame's flush.
    pub fn cancel_modifier_from_handle(&mut self, handle: ModifierHandle) {
        if !handle.is_valid() {
            warn!("ignoring cancel of an invalid modifier handle");
            return;
        }
        self.requests.cancelled_modifiers.push(handle);
    }

    /// Returns `true` if a modifier with `handle` is pending, queued or
    /// active and not cancelled.
    pub fn has_movement_modifier(&self, handle: ModifierHandle) -> bool {
        if !handle.is_valid() || self.requests.cancelled_modifiers.contains(&handle) {
            return false;
        }
        if self
            .requests
            .modifiers
            .iter()
            .any(|m| m.base().handle == handle)
        {
            return true;
        }
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .sync_state
            .movement_modifiers
            .find_modifier(handle)
            .is_some_and(|m| m.base().duration_ms != 0.0)
    }

    /// Queues an effect applied at the start of the next frame.
    pub fn queue_instant_effect(&mut self, effect: Box<dyn InstantMovementEffect>) {
        self.requests.instant_effects.push(Arc::from(effect));
    }

    /// Requests a switch to `mode_name` at the start of the next frame.
    pub fn queue_next_mode(&mut self, mode_name: &str) {
        if !self.modes.contains_key(mode_name) {
            warn!(mode = mode_name, "queued unknown movement mode");
            return;
        }
        self.requests.next_mode = Some(mode_name.to_string());
    }

    // -- Simulation --------------------------------------------------------

    /// Input for a frame.
    ///
    /// Fresh frames ask the input producer. Resimulated frames replay the
    /// input produced for the same frame and never call the producer. Only
    /// the last [`INPUT_REPLAY_FRAMES`] frames can be replayed; older frames
    /// get an empty input.
    pub fn produce_input(&mut self, time_step: &MoverTimeStep) -> MoverInputCmdContext {
        let frame = time_step.server_frame;
        if time_step.is_resimulating {
            if let Some((_, input_cmd)) = self.recent_inputs.iter().find(|(f, _)| *f == frame) {
                return input_cmd.clone();
            }
            warn!(frame, "no recorded input for resimulated frame");
            return MoverInputCmdContext::default();
        }
        let mut input_cmd = MoverInputCmdContext::default();
        if let Some(producer) = self.input_producer.as_mut() {
            producer.produce_input(time_step.step_ms, &mut input_cmd);
        }
        self.last_input_cmd.clone_from(&input_cmd);
        self.recent_inputs.retain(|(f, _)| *f != frame);
        if self.recent_inputs.len() == INPUT_REPLAY_FRAMES {
            self.recent_inputs.pop_front();
        }
        self.recent_inputs.push_back((frame, input_cmd.clone()));
        input_cmd
    }

    /// Hands over the gameplay requests made since the last fresh frame.
    pub fn take_gameplay_requests(&mut self) -> GameplayRequests {
        mem::take(&mut self.requests)
    }

    /// Start data for a frame: the committed state with `requests` folded
    /// in. Cancels apply after queued modifiers so a modifier queued and
    /// cancelled between two frames still starts and ends.
    pub fn build_tick_start(
        &self,
        time_step: &MoverTimeStep,
        input_cmd: MoverInputCmdContext,
        requests: &GameplayRequests,
    ) -> MoverTickStartData {
        let (mut sync_state, aux_state) = {
            let cached = self.cached.read().unwrap_or_else(PoisonError::into_inner);
            (cached.sync_state.clone(), cached.aux_state.clone())
        };

        for layered_move in &requests.layered_moves {
            sync_state.layered_moves.queue_move(layered_move.clone());
        }
        for modifier in &requests.modifiers {
            sync_state.movement_modifiers.queue_modifier(modifier.clone());
        }
        for handle in &requests.cancelled_modifiers {
            sync_state.movement_modifiers.cancel_modifier_from_handle(*handle);
        }
        for effect in &requests.instant_effects {
            if effect.apply(time_step, &mut sync_state) {
                debug!(?effect, frame = time_step.server_frame, "instant effect applied");
            }
        }
        if let Some(mode) = &requests.next_mode {
            sync_state.movement_mode.clone_from(mode);
        }

        MoverTickStartData {
            input_cmd,
            sync_state,
            aux_state,
        }
    }

    /// Runs one simulation step from `start` and commits the result.
    ///
    /// With ticking disabled the start state is returned unchanged.
    pub fn simulation_tick(
        &mut self,
        time_step: &MoverTimeStep,
        start: &MoverTickStartData,
    ) -> MoverTickEndData {
        let mut output = MoverTickEndData::from_start(start);
        if !self.tick_enabled {
            return output;
        }

        // Resolve the active mode.
        let requested = if start.sync_state.movement_mode.is_empty() {
            self.starting_mode.clone()
        } else {
            start.sync_state.movement_mode.clone()
        };
        output.sync_state.movement_mode.clone_from(&requested);
        let mut mode_name = self.remapped_mode_name(&requested, &start.sync_state);
        if !self.modes.contains_key(&mode_name) {
            warn!(
                mode = %mode_name,
                "no movement mode registered under this name, ticking disabled"
            );
            self.tick_enabled = false;
            return output;
        }
        self.activate_mode(&mode_name, time_step);

        let mut deferred_mode = None;
        if let Some(result) = self.evaluate_transitions(&mode_name, start, time_step) {
            if !self.modes.contains_key(&result.next_mode) {
                warn!(
                    from = %mode_name,
                    to = %result.next_mode,
                    "transition to unknown movement mode ignored"
                );
            } else if result.immediate {
                output.sync_state.movement_mode.clone_from(&result.next_mode);
                mode_name = self.remapped_mode_name(&result.next_mode, &start.sync_state);
                self.activate_mode(&mode_name, time_step);
            } else {
                deferred_mode = Some(result.next_mode);
            }
        }

        // Compose the proposed move.
        let now = time_step.base_sim_time_ms;
        let up = self.environment.up_direction;
        let mut layered = mem::take(&mut output.sync_state.layered_moves);
        let mut modifiers = mem::take(&mut output.sync_state.movement_modifiers);

        let active_modifiers =
            modifiers.generate_active_modifiers(&self.environment, &mut self.blackboard, now);
        for modifier in active_modifiers.iter_mut() {
            modifier.on_pre_movement(time_step, &mut self.blackboard);
        }

        let ctx = MoveGenerationContext {
            time_step,
            start_state: start,
            environment: &self.environment,
        };
        let mut mixer = LayeredMoveMixer::new();
        let active_moves =
            layered.generate_active_moves(&self.environment, &mut self.blackboard, now);
        for layered_move in active_moves {
            let Some(mut proposal) = layered_move.generate_move(&ctx, &mut self.blackboard)
            else {
                continue;
            };
            let base = layered_move.base();
            if base.start_sim_time_ms != now {
                // Only a move's first tick may pick the mode.
                proposal.preferred_mode = None;
            }
            mixer.mix(proposal, base.priority, base.start_sim_time_ms);
        }
        let layered_proposal = mixer.finish(up);

        if let Some(preferred) = layered_proposal
            .as_ref()
            .and_then(|p| p.preferred_mode.clone())
            && preferred != output.sync_state.movement_mode
        {
            if self.modes.contains_key(&preferred) {
                debug!(from = %mode_name, to = %preferred, "layered move switched movement mode");
                mode_name = self.remapped_mode_name(&preferred, &start.sync_state);
                output.sync_state.movement_mode = preferred;
                self.activate_mode(&mode_name, time_step);
            } else {
                warn!(mode = %preferred, "layered move preferred an unknown movement mode");
            }
        }

        let Some(mode) = self.modes.get(&mode_name) else {
            unreachable!("active mode was validated above");
        };
        let mut proposed =
            mode.generate_move(start, time_step, &self.environment, &self.blackboard);
        if let Some(layered_proposal) = &layered_proposal {
            proposed.apply_layered(layered_proposal, up);
        }
        for modifier in modifiers.active_modifiers() {
            modifier.modify_proposed_move(&mut proposed);
        }

        // Integrate.
        let params = SimulationTickParams {
            time_step,
            start_state: start,
            proposed_move: &proposed,
            environment: &self.environment,
        };
        mode.simulation_tick(&params, &mut self.blackboard, &mut output);

        // Commit. Residual velocity goes last so the next tick's composition
        // starts from it.
        if layered.has_residual_velocity() {
            let state = output
                .sync_state
                .sync_state_collection
                .find_or_add_mut::<MoverDefaultSyncState>();
            state.velocity = layered.apply_residual_velocity(state.velocity);
        }
        output.sync_state.layered_moves = layered;
        for modifier in modifiers.active_modifiers_mut() {
            modifier.on_post_movement(time_step, &mut output.sync_state, &mut self.blackboard);
        }
        output.sync_state.movement_modifiers = modifiers;

        let next_mode = output
            .movement_end_state
            .next_mode_name
            .take()
            .or(deferred_mode);
        if let Some(next) = next_mode {
            if self.modes.contains_key(&next) {
                output.sync_state.movement_mode.clone_from(&next);
                output.movement_end_state.next_mode_name = Some(next);
            } else {
                warn!(mode = %next, "requested next movement mode is unknown, staying");
            }
        }

        trace!(
            frame = time_step.server_frame,
            mode = %output.sync_state.movement_mode,
            resimulating = time_step.is_resimulating,
            "simulation tick committed"
        );
        self.finalize_frame(&output.sync_state, &output.aux_state);
        output
    }

    /// Replaces the committed state. Holds the write lock only for the copy.
    pub fn finalize_frame(&self, sync_state: &MoverSyncState, aux_state: &MoverAuxStateContext) {
        let mut cached = self.cached.write().unwrap_or_else(PoisonError::into_inner);
        cached.sync_state.clone_from(sync_state);
        cached.aux_state.clone_from(aux_state);
    }

    /// Restores a historical state ahead of a resimulation.
    ///
    /// Cached blackboard entries describe the discarded timeline, so they
    /// are dropped.
    pub fn restore_frame(
        &mut self,
        sync_state: &MoverSyncState,
        aux_state: &MoverAuxStateContext,
    ) {
        self.finalize_frame(sync_state, aux_state);
        self.blackboard.invalidate_all();
        // Re-run activation so per-mode blackboard entries are rebuilt.
        self.active_mode = None;
        self.tick_enabled = true;
    }

    pub fn on_simulation_pre_rollback(
        &mut self,
        invalid: &MoverSyncState,
        corrected: &MoverSyncState,
    ) {
        debug!(
            invalid_mode = %invalid.movement_mode,
            corrected_mode = %corrected.movement_mode,
            "rolling back"
        );
        for listener in &mut self.rollback_listeners {
            listener.on_pre_rollback(invalid, corrected);
        }
    }

    pub fn on_simulation_post_rollback(
        &mut self,
        invalid: &MoverSyncState,
        corrected: &MoverSyncState,
    ) {
        for listener in &mut self.rollback_listeners {
            listener.on_post_rollback(invalid, corrected);
        }
    }

    // -- Internals ---------------------------------------------------------

    fn remapped_mode_name(&self, name: &str, sync_state: &MoverSyncState) -> String {
        let mut resolved = name;
        for modifier in sync_state.movement_modifiers.active_modifiers() {
            if let Some(remapped) = modifier.remap_mode(resolved) {
                resolved = remapped;
            }
        }
        resolved.to_string()
    }

    fn evaluate_transitions(
        &self,
        mode_name: &str,
        start: &MoverTickStartData,
        time_step: &MoverTimeStep,
    ) -> Option<TransitionResult> {
        let mode = self.modes.get(mode_name)?;
        mode.transitions()
            .iter()
            .chain(self.global_transitions.iter())
            .find_map(|transition| transition.evaluate(start, time_step, &self.blackboard))
    }

    fn activate_mode(&mut self, mode_name: &str, time_step: &MoverTimeStep) {
        if self.active_mode.as_deref() == Some(mode_name) {
            return;
        }
        if let Some(previous) = self.active_mode.take()
            && let Some(mode) = self.modes.get(&previous)
        {
            mode.on_deactivated(&mut self.blackboard);
        }
        if let Some(mode) = self.modes.get(mode_name) {
            mode.on_activated(&mut self.blackboard);
        }
        self.blackboard
            .set(keys::MODE_ENTERED_AT_MS, time_step.base_sim_time_ms);
        debug!(mode = mode_name, frame = time_step.server_frame, "movement mode activated");
        self.active_mode = Some(mode_name.to_string());
    }
}

#[cfg(test)]
#[path = "component_tests.rs"]
mod tests;
