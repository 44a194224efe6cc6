//! The boundary between a mover and whatever schedules it.
//!
//! [`MoverBackendLiaison`] is what a replication layer or presentation
//! layer sees: the current frame, the pending (authoritative) sync state and
//! the presentation states. [`StandaloneLiaison`] implements it with a
//! fixed-step driver that keeps a bounded history so authoritative
//! corrections can be resimulated.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use crate::component::{GameplayRequests, MoverComponent};
use crate::error::LiaisonError;
use crate::history::{FrameHistory, FrameRecord};
use crate::output_record::{SimulationOutputData, SimulationOutputRecord};
use crate::schedule::{MoverTickSet, PhaseGate};
use crate::types::{
    MoverAuxStateContext, MoverInputCmdContext, MoverSyncState, MoverTickEndData,
    MoverTickStartData, MoverTimeStep,
};

/// Read/write access to a mover's simulation state from outside the tick.
pub trait MoverBackendLiaison: Send + Sync {
    fn current_sim_time_ms(&self) -> f64;

    fn current_sim_frame(&self) -> i32;

    /// Most recently committed sync state.
    fn read_pending_sync_state(&self) -> Option<MoverSyncState>;

    /// Overwrites the committed state the next frame starts from. Fails
    /// while a frame is between simulation and commit.
    fn write_pending_sync_state(&self, sync_state: MoverSyncState) -> Result<(), LiaisonError>;

    fn read_presentation_sync_state(&self) -> Option<MoverSyncState>;

    fn write_presentation_sync_state(&self, sync_state: MoverSyncState);

    fn read_prev_presentation_sync_state(&self) -> Option<MoverSyncState>;

    fn write_prev_presentation_sync_state(&self, sync_state: MoverSyncState);
}

/// Result of [`StandaloneLiaison::apply_authoritative_correction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionOutcome {
    /// The recorded state already matched the authority.
    NoCorrection,
    /// The history was rewound and this many frames were replayed.
    Resimulated { frames: usize },
}

#[derive(Debug)]
struct InFlightFrame {
    time_step: MoverTimeStep,
    requests: GameplayRequests,
    committed_sync: MoverSyncState,
    committed_aux: MoverAuxStateContext,
    start: MoverTickStartData,
    end: Option<MoverTickEndData>,
}

/// Fixed-step driver for one mover.
#[derive(Debug)]
pub struct StandaloneLiaison {
    component: MoverComponent,
    history: FrameHistory,
    gate: PhaseGate,
    frame: i32,
    sim_time_ms: f64,
    in_flight: Option<InFlightFrame>,
    commit_in_progress: AtomicBool,
    pending: RwLock<Option<MoverSyncState>>,
    presentation: RwLock<Option<MoverSyncState>>,
    prev_presentation: RwLock<Option<MoverSyncState>>,
    output_record: SimulationOutputRecord,
}

impl StandaloneLiaison {
    /// Wraps an initialized component, keeping `history_frames` frames for
    /// corrections.
    pub fn new(component: MoverComponent, history_frames: usize) -> Self {
        let initial = component.cached_sync_state();
        Self {
            component,
            history: FrameHistory::new(history_frames),
            gate: PhaseGate::new(),
            frame: 0,
            sim_time_ms: 0.0,
            in_flight: None,
            commit_in_progress: AtomicBool::new(false),
            pending: RwLock::new(Some(initial.clone())),
            presentation: RwLock::new(Some(initial)),
            prev_presentation: RwLock::new(None),
            output_record: SimulationOutputRecord::new(),
        }
    }

    pub fn component(&self) -> &MoverComponent {
        &self.component
    }

    /// Gameplay access to the component between frames.
    pub fn component_mut(&mut self) -> &mut MoverComponent {
        &mut self.component
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    pub fn output_record(&self) -> &SimulationOutputRecord {
        &self.output_record
    }

    // -- Phases ------------------------------------------------------------

    /// Produces the input and start data of the next frame.
    pub fn produce_input_phase(&mut self, step_ms: f32) -> Result<(), LiaisonError> {
        self.gate.enter(MoverTickSet::ProduceInput)?;
        let time_step = MoverTimeStep {
            server_frame: self.frame,
            base_sim_time_ms: self.sim_time_ms,
            step_ms,
            is_resimulating: false,
        };
        let committed_sync = self.component.cached_sync_state();
        let committed_aux = self.component.cached_aux_state();
        let input_cmd = self.component.produce_input(&time_step);
        let requests = self.component.take_gameplay_requests();
        let start = self
            .component
            .build_tick_start(&time_step, input_cmd, &requests);
        self.in_flight = Some(InFlightFrame {
            time_step,
            requests,
            committed_sync,
            committed_aux,
            start,
            end: None,
        });
        // The start data is built, so pending writes would be lost.
        self.commit_in_progress.store(true, Ordering::Release);
        Ok(())
    }

    /// Records the frame in the history and simulates it.
    pub fn simulate_phase(&mut self) -> Result<(), LiaisonError> {
        self.gate.enter(MoverTickSet::SimulateMovement)?;
        let Some(in_flight) = self.in_flight.as_mut() else {
            return Err(LiaisonError::NoPendingState);
        };
        self.history.push(FrameRecord {
            frame: in_flight.time_step.server_frame,
            time_step: in_flight.time_step,
            input_cmd: in_flight.start.input_cmd.clone(),
            requests: mem::take(&mut in_flight.requests),
            sync_state: mem::take(&mut in_flight.committed_sync),
            aux_state: mem::take(&mut in_flight.committed_aux),
        });
        let end = self
            .component
            .simulation_tick(&in_flight.time_step, &in_flight.start);
        in_flight.end = Some(end);
        Ok(())
    }

    /// Publishes the simulated frame and moves the clock forward.
    pub fn apply_state_phase(&mut self) -> Result<(), LiaisonError> {
        self.gate.enter(MoverTickSet::ApplyState)?;
        let Some(InFlightFrame {
            time_step,
            start,
            end: Some(end),
            ..
        }) = self.in_flight.take()
        else {
            self.commit_in_progress.store(false, Ordering::Release);
            return Err(LiaisonError::NoPendingState);
        };
        self.publish(time_step, end.sync_state, start.input_cmd);
        self.frame = time_step.server_frame + 1;
        self.sim_time_ms = time_step.end_sim_time_ms();
        self.commit_in_progress.store(false, Ordering::Release);
        Ok(())
    }

    /// Runs all three phases for one frame.
    pub fn advance(&mut self, step_ms: f32) -> Result<(), LiaisonError> {
        self.produce_input_phase(step_ms)?;
        self.simulate_phase()?;
        self.apply_state_phase()
    }

    // -- Corrections -------------------------------------------------------

    /// Reconciles against the authoritative committed state `frame` started
    /// from, that is the state at the end of the frame before it.
    ///
    /// If the recorded state diverges, the component is restored to the
    /// authority and every recorded frame from `frame` on is replayed with
    /// the input and gameplay requests it originally consumed. Missing aux
    /// state is taken from the record.
    pub fn apply_authoritative_correction(
        &mut self,
        frame: i32,
        sync_state: MoverSyncState,
        aux_state: Option<MoverAuxStateContext>,
    ) -> Result<CorrectionOutcome, LiaisonError> {
        if self.gate.expected() != MoverTickSet::ProduceInput {
            return Err(LiaisonError::CommitInProgress);
        }
        let record = self
            .history
            .get(frame)
            .ok_or(LiaisonError::FrameNotInHistory { frame })?;
        if !record.sync_state.should_reconcile(&sync_state) {
            debug!(frame, "authoritative state matches prediction");
            return Ok(CorrectionOutcome::NoCorrection);
        }

        let invalid = record.sync_state.clone();
        let aux_state = aux_state.unwrap_or_else(|| record.aux_state.clone());
        let replay: Vec<(MoverTimeStep, MoverInputCmdContext, GameplayRequests)> = self
            .history
            .records_from(frame)
            .map(|r| (r.time_step, r.input_cmd.clone(), r.requests.clone()))
            .collect();

        self.component
            .on_simulation_pre_rollback(&invalid, &sync_state);
        self.component.restore_frame(&sync_state, &aux_state);

        let mut last = None;
        for (time_step, input_cmd, requests) in replay.iter() {
            let mut resim_step = *time_step;
            resim_step.is_resimulating = true;
            self.history.push(FrameRecord {
                frame: time_step.server_frame,
                time_step: *time_step,
                input_cmd: input_cmd.clone(),
                requests: requests.clone(),
                sync_state: self.component.cached_sync_state(),
                aux_state: self.component.cached_aux_state(),
            });
            let start = self
                .component
                .build_tick_start(&resim_step, input_cmd.clone(), requests);
            let end = self.component.simulation_tick(&resim_step, &start);
            last = Some((resim_step, end, start.input_cmd));
        }
        if let Some((time_step, end, input_cmd)) = last {
            self.publish(time_step, end.sync_state, input_cmd);
        }

        self.component
            .on_simulation_post_rollback(&invalid, &sync_state);
        info!(frame, frames = replay.len(), "resimulated after authoritative correction");
        Ok(CorrectionOutcome::Resimulated {
            frames: replay.len(),
        })
    }

    fn publish(
        &mut self,
        time_step: MoverTimeStep,
        sync_state: MoverSyncState,
        input_cmd: MoverInputCmdContext,
    ) {
        *self.pending.write().unwrap_or_else(PoisonError::into_inner) = Some(sync_state.clone());
        {
            let mut presentation = self
                .presentation
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let previous = presentation.replace(sync_state.clone());
            *self
                .prev_presentation
                .write()
                .unwrap_or_else(PoisonError::into_inner) = previous;
        }
        self.output_record.add(
            time_step,
            SimulationOutputData {
                sync_state,
                last_used_input_cmd: input_cmd,
                additional_outputs: Default::default(),
            },
        );
    }
}

impl MoverBackendLiaison for StandaloneLiaison {
    fn current_sim_time_ms(&self) -> f64 {
        self.sim_time_ms
    }

    fn current_sim_frame(&self) -> i32 {
        self.frame
    }

    fn read_pending_sync_state(&self) -> Option<MoverSyncState> {
        self.pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_pending_sync_state(&self, sync_state: MoverSyncState) -> Result<(), LiaisonError> {
        if self.commit_in_progress.load(Ordering::Acquire) {
            return Err(LiaisonError::CommitInProgress);
        }
        let aux_state = self.component.cached_aux_state();
        self.component.finalize_frame(&sync_state, &aux_state);
        *self.pending.write().unwrap_or_else(PoisonError::into_inner) = Some(sync_state);
        Ok(())
    }

    fn read_presentation_sync_state(&self) -> Option<MoverSyncState> {
        self.presentation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_presentation_sync_state(&self, sync_state: MoverSyncState) {
        *self
            .presentation
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sync_state);
    }

    fn read_prev_presentation_sync_state(&self) -> Option<MoverSyncState> {
        self.prev_presentation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write_prev_presentation_sync_state(&self, sync_state: MoverSyncState) {
        *self
            .prev_presentation
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sync_state);
    }
}

#[cfg(test)]
#[path = "liaison_tests.rs"]
mod tests;
