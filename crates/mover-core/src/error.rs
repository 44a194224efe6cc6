//! Errors raised by the simulation driver.

use thiserror::Error;

use crate::schedule::MoverTickSet;

/// Errors raised by a backend liaison.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LiaisonError {
    /// The pending state cannot be written while a commit is running.
    #[error("cannot write pending sync state while a commit is in progress")]
    CommitInProgress,

    /// A phase ran without the frame data the previous phase produces.
    #[error("no frame is in flight for this phase")]
    NoPendingState,

    /// A correction named a frame that is no longer (or not yet) recorded.
    #[error("frame {frame} is not in the simulation history")]
    FrameNotInHistory {
        /// The requested frame.
        frame: i32,
    },

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// A tick phase was run out of order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhaseError {
    /// The phase that ran was not the one expected next.
    #[error("tick phase {found:?} ran while {expected:?} was expected")]
    OutOfOrder {
        /// Phase that should have run.
        expected: MoverTickSet,
        /// Phase that actually ran.
        found: MoverTickSet,
    },
}
