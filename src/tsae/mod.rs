//! Timestamped anti-entropy core
//!
//! The per-replica operation log and the timestamp vector summaries that
//! replicas exchange to work out which operations a peer is missing.

mod matrix;
mod replicated_log;
mod timestamp;
mod vector;

pub use matrix::TimestampMatrix;
pub use replicated_log::{ReplicatedLog, Sequencing, Timestamped};
pub use timestamp::{ReplicaId, SeqNum, Timestamp, NULL_SEQ_NUMBER};
pub use vector::TimestampVector;

use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TsaeError {
    #[error("Duplicate participant: {0}")]
    DuplicateParticipant(ReplicaId),

    #[error("Participant list is empty")]
    EmptyParticipants,

    #[error("Unknown participant: {0}")]
    UnknownParticipant(ReplicaId),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Sequence numbers exhausted for replica {0}")]
    SequenceExhausted(ReplicaId),

    #[error("Operation rejected by log: {0}")]
    Rejected(String),
}

/// Reject participant lists that name the same replica twice.
pub(crate) fn check_unique(participants: &[ReplicaId]) -> Result<(), TsaeError> {
    let mut seen = HashSet::with_capacity(participants.len());
    for id in participants {
        if !seen.insert(id.as_str()) {
            return Err(TsaeError::DuplicateParticipant(id.clone()));
        }
    }
    Ok(())
}
