//! Double-buffered simulation output for presentation.
//!
//! The simulation runs at a fixed rate while presentation samples whenever
//! it likes. [`SimulationOutputRecord`] keeps the two most recent outputs and
//! blends between them.

use crate::data_collection::MoverDataCollection;
use crate::types::{MoverInputCmdContext, MoverSyncState, MoverTimeStep};

/// What one simulation step produced.
#[derive(Debug, Clone, Default)]
pub struct SimulationOutputData {
    pub sync_state: MoverSyncState,
    /// The input the step consumed.
    pub last_used_input_cmd: MoverInputCmdContext,
    /// Extra per-step outputs (events, debug data).
    pub additional_outputs: MoverDataCollection,
}

impl SimulationOutputData {
    /// Blend of `from` toward `to`.
    pub fn interpolate(from: &Self, to: &Self, pct: f32) -> Self {
        let mut additional_outputs = MoverDataCollection::new();
        additional_outputs.interpolate(&from.additional_outputs, &to.additional_outputs, pct);
        Self {
            sync_state: MoverSyncState::interpolate(&from.sync_state, &to.sync_state, pct),
            last_used_input_cmd: to.last_used_input_cmd.clone(),
            additional_outputs,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Sample {
    time_step: MoverTimeStep,
    data: SimulationOutputData,
}

/// The two most recent simulation outputs.
#[derive(Debug, Clone, Default)]
pub struct SimulationOutputRecord {
    samples: [Option<Sample>; 2],
    current_index: usize,
}

impl SimulationOutputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new output, making the previous latest the previous sample.
    pub fn add(&mut self, time_step: MoverTimeStep, data: SimulationOutputData) {
        self.current_index = 1 - self.current_index;
        self.samples[self.current_index] = Some(Sample { time_step, data });
    }

    /// Most recent output.
    pub fn latest(&self) -> Option<(&MoverTimeStep, &SimulationOutputData)> {
        self.samples[self.current_index]
            .as_ref()
            .map(|s| (&s.time_step, &s.data))
    }

    /// Output before the most recent one.
    pub fn previous(&self) -> Option<(&MoverTimeStep, &SimulationOutputData)> {
        self.samples[1 - self.current_index]
            .as_ref()
            .map(|s| (&s.time_step, &s.data))
    }

    /// Output at `sim_time_ms`, blended between the two samples.
    ///
    /// Samples are keyed by the end time of their step. Times outside the
    /// recorded range clamp to the nearest sample. Returns `None` only if
    /// nothing has been recorded.
    pub fn interpolated(&self, sim_time_ms: f64) -> Option<SimulationOutputData> {
        let (latest_ts, latest) = self.latest()?;
        let Some((previous_ts, previous)) = self.previous() else {
            return Some(latest.clone());
        };

        let from_ms = previous_ts.end_sim_time_ms();
        let to_ms = latest_ts.end_sim_time_ms();
        if sim_time_ms <= from_ms {
            return Some(previous.clone());
        }
        if sim_time_ms >= to_ms || to_ms <= from_ms {
            return Some(latest.clone());
        }

        let pct = ((sim_time_ms - from_ms) / (to_ms - from_ms)) as f32;
        Some(SimulationOutputData::interpolate(previous, latest, pct))
    }

    pub fn clear(&mut self) {
        self.samples = [None, None];
        self.current_index = 0;
    }
}
