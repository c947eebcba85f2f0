//! Replicated operations
//!
//! The log only looks at an operation's timestamp; the payload is carried
//! along untouched.

use crate::tsae::{ReplicaId, SeqNum, Timestamp, Timestamped};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What an operation does to the replicated data set
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    /// Store a value under a key
    Put { key: String, value: String },

    /// Remove a key
    Remove { key: String },
}

impl OpKind {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        OpKind::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        OpKind::Remove { key: key.into() }
    }

    /// The key this operation affects
    pub fn key(&self) -> &str {
        match self {
            OpKind::Put { key, .. } => key,
            OpKind::Remove { key } => key,
        }
    }
}

/// An operation stamped by the replica that issued it.
///
/// Immutable once built: accepted operations are shared read-only records.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    timestamp: Timestamp,
    kind: OpKind,
}

impl Operation {
    pub fn new(timestamp: Timestamp, kind: OpKind) -> Self {
        Self { timestamp, kind }
    }

    /// Build an operation from its origin and sequence number
    pub fn at(origin: impl Into<ReplicaId>, seq: SeqNum, kind: OpKind) -> Self {
        Self::new(Timestamp::new(origin, seq), kind)
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn origin(&self) -> &str {
        self.timestamp.host_id()
    }
}

impl Timestamped for Operation {
    fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OpKind::Put { key, value } => write!(f, "put {}={} @ {}", key, value, self.timestamp),
            OpKind::Remove { key } => write!(f, "remove {} @ {}", key, self.timestamp),
        }
    }
}
