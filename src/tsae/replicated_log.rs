//! The replicated operation log
//!
//! The log keeps one append-only stream per participant, ordered by the
//! origin's sequence numbers. The set of streams is fixed at construction,
//! so the outer map is never mutated and can be shared without locking;
//! each stream sits behind its own mutex so appends and scans on different
//! origins never contend.

use super::matrix::TimestampMatrix;
use super::timestamp::{ReplicaId, Timestamp};
use super::vector::TimestampVector;
use super::{check_unique, TsaeError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Anything that carries the timestamp it was issued with.
pub trait Timestamped {
    fn timestamp(&self) -> &Timestamp;
}

/// How strictly `add` checks an origin's sequence numbers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sequencing {
    /// Accept any sequence number greater than the last one (gaps allowed)
    #[default]
    Lax,
    /// Accept only the sequence number right after the last one
    Contiguous,
}

/// Per-replica log of operations, one stream per origin.
pub struct ReplicatedLog<O> {
    log: BTreeMap<ReplicaId, Mutex<Vec<O>>>,
    sequencing: Sequencing,
}

/// Appends either finish or leave the Vec untouched, so a poisoned stream is still consistent.
fn lock_stream<O>(stream: &Mutex<Vec<O>>) -> MutexGuard<'_, Vec<O>> {
    stream.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<O: Timestamped> ReplicatedLog<O> {
    /// Create an empty log with lax sequencing
    pub fn new(participants: &[ReplicaId]) -> Result<Self, TsaeError> {
        Self::with_sequencing(participants, Sequencing::default())
    }

    /// Create an empty log with the given sequencing policy
    pub fn with_sequencing(
        participants: &[ReplicaId],
        sequencing: Sequencing,
    ) -> Result<Self, TsaeError> {
        check_unique(participants)?;
        let log = participants
            .iter()
            .map(|id| (id.clone(), Mutex::new(Vec::new())))
            .collect();
        Ok(Self { log, sequencing })
    }

    pub fn sequencing(&self) -> Sequencing {
        self.sequencing
    }

    /// Append an operation to its origin's stream.
    ///
    /// Returns false, leaving the log unchanged, when the timestamp is null,
    /// the origin is unknown, the first operation is not seq 0, or the
    /// operation does not come after the current tail.
    pub fn add(&self, op: O) -> bool {
        let ts = op.timestamp();

        if ts.is_null() {
            log::warn!("Rejecting operation with null timestamp");
            return false;
        }

        let Some(stream) = self.log.get(ts.host_id()) else {
            log::warn!("Rejecting operation from unknown replica {}", ts.host_id());
            return false;
        };

        let mut ops = lock_stream(stream);

        let last = match ops.last() {
            Some(tail) => tail.timestamp().clone(),
            None if ts.seq_number() == 0 => {
                log::trace!("Added first operation from {}", ts.host_id());
                ops.push(op);
                return true;
            }
            None => {
                log::warn!("Expected seq 0 as first operation from {}, got {}", ts.host_id(), ts);
                return false;
            }
        };

        debug_assert_eq!(last.host_id(), ts.host_id(), "stream holds a foreign timestamp");

        match ts.compare(&last) {
            Ordering::Less | Ordering::Equal => {
                log::trace!("Ignoring old or duplicate operation {}", ts);
                false
            }
            Ordering::Greater
                if self.sequencing == Sequencing::Contiguous
                    && last.seq_number().checked_add(1) != Some(ts.seq_number()) =>
            {
                log::warn!("Sequence gap: expected operation after {}, got {}", last, ts);
                false
            }
            Ordering::Greater => {
                log::trace!("Added operation {}", ts);
                ops.push(op);
                true
            }
        }
    }

    /// Every operation newer than what `summary` records for its origin.
    ///
    /// Origins the summary does not know are treated as fully unseen.
    /// Within one origin the operations come out in log order.
    pub fn list_newer(&self, summary: &TimestampVector) -> Vec<O>
    where
        O: Clone,
    {
        let mut newer = Vec::new();

        for (replica, stream) in &self.log {
            let seen = summary
                .get_last(replica)
                .unwrap_or_else(|| Timestamp::null(replica.as_str()));

            let ops = lock_stream(stream);
            newer.extend(
                ops.iter()
                    .filter(|op| op.timestamp().compare(&seen) == Ordering::Greater)
                    .cloned(),
            );
        }

        newer
    }

    /// Drop operations every replica has acknowledged.
    ///
    /// Compaction is not implemented yet; the log is left untouched.
    pub fn purge_log(&self, ack: &TimestampMatrix) {
        log::debug!(
            "Log purge requested (acknowledged: {:?}); compaction disabled",
            ack.min_timestamp_vector().map(|v| v.snapshot())
        );
    }

    /// All origins this log keeps a stream for
    pub fn participants(&self) -> impl Iterator<Item = &ReplicaId> {
        self.log.keys()
    }

    /// Total number of operations across all origins
    pub fn len(&self) -> usize {
        self.log.values().map(|stream| lock_stream(stream).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of one origin's stream, or None for an unknown origin
    pub fn operations_from(&self, replica: &str) -> Option<Vec<O>>
    where
        O: Clone,
    {
        self.log.get(replica).map(|stream| lock_stream(stream).clone())
    }

    /// Timestamp of the newest operation from an origin.
    ///
    /// None for an unknown origin or an empty stream.
    pub fn last_timestamp(&self, replica: &str) -> Option<Timestamp> {
        let stream = self.log.get(replica)?;
        let ops = lock_stream(stream);
        ops.last().map(|op| op.timestamp().clone())
    }

    /// SHA-256 over every stream, origins in id order.
    ///
    /// Two logs with the same content produce the same digest, which lets
    /// replicas compare logs without shipping them.
    pub fn digest(&self) -> Result<String, TsaeError>
    where
        O: Serialize,
    {
        let mut hasher = Sha256::new();
        for (replica, stream) in &self.log {
            hasher.update(replica.as_bytes());
            for op in lock_stream(stream).iter() {
                let bytes = serde_json::to_vec(op)
                    .map_err(|e| TsaeError::Serialization(e.to_string()))?;
                hasher.update(&bytes);
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

impl<O: PartialEq + Clone> PartialEq for ReplicatedLog<O> {
    /// Never holds two stream locks at once: one side is copied out and
    /// its lock released before the other side is locked.
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.log.len() == other.log.len()
            && self.log.iter().zip(&other.log).all(|((a_id, a), (b_id, b))| {
                if a_id != b_id {
                    return false;
                }
                let mine = lock_stream(a).clone();
                mine == *lock_stream(b)
            })
    }
}

impl<O: fmt::Display> fmt::Display for ReplicatedLog<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stream in self.log.values() {
            for op in lock_stream(stream).iter() {
                writeln!(f, "{}", op)?;
            }
        }
        Ok(())
    }
}

impl<O> fmt::Debug for ReplicatedLog<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicatedLog")
            .field("participants", &self.log.keys().collect::<Vec<_>>())
            .field("sequencing", &self.sequencing)
            .finish()
    }
}
