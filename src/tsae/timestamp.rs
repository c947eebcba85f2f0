//! Logical timestamps
//!
//! A Timestamp names one operation in one replica's stream: the replica that
//! produced it and its position in that replica's history. Timestamps from
//! different replicas are never ordered against each other.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Unique identifier for a replica
pub type ReplicaId = String;

/// Sequence number within a replica's operation stream
pub type SeqNum = i64;

/// Sequence number of the null timestamp ("nothing seen yet")
pub const NULL_SEQ_NUMBER: SeqNum = -1;

/// A per-origin logical timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    host_id: ReplicaId,
    seq_number: SeqNum,
}

impl Timestamp {
    /// Create a timestamp. Any negative sequence number is the null timestamp.
    pub fn new(host_id: impl Into<ReplicaId>, seq_number: SeqNum) -> Self {
        Self {
            host_id: host_id.into(),
            seq_number: seq_number.max(NULL_SEQ_NUMBER),
        }
    }

    /// The null timestamp for a replica
    pub fn null(host_id: impl Into<ReplicaId>) -> Self {
        Self::new(host_id, NULL_SEQ_NUMBER)
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn seq_number(&self) -> SeqNum {
        self.seq_number
    }

    pub fn is_null(&self) -> bool {
        self.seq_number == NULL_SEQ_NUMBER
    }

    /// The timestamp that directly follows this one in the same stream.
    ///
    /// None once the stream has reached `SeqNum::MAX`.
    pub fn next(&self) -> Option<Self> {
        let seq_number = self.seq_number.checked_add(1)?;
        Some(Self::new(self.host_id.clone(), seq_number))
    }

    /// Compare two timestamps of the same origin.
    ///
    /// Only the sequence numbers are compared; null sorts below every
    /// non-null value. Comparing across origins is a caller bug.
    pub fn compare(&self, other: &Timestamp) -> Ordering {
        debug_assert_eq!(
            self.host_id, other.host_id,
            "timestamps from different origins are not comparable"
        );
        self.seq_number.cmp(&other.seq_number)
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.host_id == other.host_id {
            Some(self.seq_number.cmp(&other.seq_number))
        } else {
            None
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "{}:null", self.host_id)
        } else {
            write!(f, "{}:{}", self.host_id, self.seq_number)
        }
    }
}
