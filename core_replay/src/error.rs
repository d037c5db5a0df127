use std::io;

use replay_runtime::{CommandDecodeError, CommandEncodeError};
use thiserror::Error;

/// How the host wants play to proceed after an out-of-sync report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OosDecision {
    Continue,
    Abort(String),
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("game aborted after out-of-sync error: {reason}")]
    Aborted { reason: String },
    #[error("no local side and no remote peer can answer [{name}]")]
    NoDecisionSource { name: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UndoError {
    #[error("no undoable command in the log")]
    NothingToUndo,
    #[error("command {index} was already sent to peers and cannot be undone")]
    AlreadySent { index: usize },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer channel disconnected")]
    Disconnected,
    #[error(transparent)]
    Encode(#[from] CommandEncodeError),
    #[error(transparent)]
    Decode(#[from] CommandDecodeError),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },
    #[error("frame io failed: {0}")]
    Io(#[from] io::Error),
}
