//! Bounded per-frame history used to resimulate after a correction.

use std::collections::VecDeque;

use crate::component::GameplayRequests;
use crate::types::{MoverAuxStateContext, MoverInputCmdContext, MoverSyncState, MoverTimeStep};

/// Default number of frames kept (about two seconds at 60 Hz).
pub const DEFAULT_HISTORY_FRAMES: usize = 128;

/// One simulated frame: the step, what it consumed and the committed state
/// it started from.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    /// Frame index.
    pub frame: i32,
    /// Step the frame was simulated with.
    pub time_step: MoverTimeStep,
    /// Input consumed by the frame. Replayed verbatim on resimulation.
    pub input_cmd: MoverInputCmdContext,
    /// Gameplay requests folded into the frame's start state.
    pub requests: GameplayRequests,
    /// Committed sync state the frame started from, before `requests`.
    pub sync_state: MoverSyncState,
    /// Committed aux state the frame started from.
    pub aux_state: MoverAuxStateContext,
}

/// Ring buffer of [`FrameRecord`]s ordered by frame.
#[derive(Debug)]
pub struct FrameHistory {
    records: VecDeque<FrameRecord>,
    max_frames: usize,
}

impl Default for FrameHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_FRAMES)
    }
}

impl FrameHistory {
    /// Creates a history keeping at most `max_frames` records.
    pub fn new(max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        Self {
            records: VecDeque::with_capacity(max_frames),
            max_frames,
        }
    }

    /// Appends a record, evicting the oldest at capacity. A record for a frame
    /// that is already present replaces it and every later record.
    pub fn push(&mut self, record: FrameRecord) {
        self.discard_from(record.frame);
        if self.records.len() >= self.max_frames {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Record for `frame`.
    pub fn get(&self, frame: i32) -> Option<&FrameRecord> {
        self.records.iter().find(|r| r.frame == frame)
    }

    /// Mutable record for `frame`.
    pub fn get_mut(&mut self, frame: i32) -> Option<&mut FrameRecord> {
        self.records.iter_mut().find(|r| r.frame == frame)
    }

    /// Records for `frame` and later, oldest first.
    pub fn records_from(&self, frame: i32) -> impl Iterator<Item = &FrameRecord> {
        self.records.iter().filter(move |r| r.frame >= frame)
    }

    /// Drops `frame` and every later record.
    pub fn discard_from(&mut self, frame: i32) {
        while self.records.back().is_some_and(|r| r.frame >= frame) {
            self.records.pop_back();
        }
    }

    /// Drops every record up to and including `frame`.
    pub fn discard_up_to(&mut self, frame: i32) {
        while self.records.front().is_some_and(|r| r.frame <= frame) {
            self.records.pop_front();
        }
    }

    pub fn oldest_frame(&self) -> Option<i32> {
        self.records.front().map(|r| r.frame)
    }

    pub fn newest_frame(&self) -> Option<i32> {
        self.records.back().map(|r| r.frame)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
