//! Timestamp vectors
//!
//! A TimestampVector records, for every participant, the latest timestamp
//! this replica has from that participant. It is the summary replicas
//! exchange during anti-entropy.
//!
//! The participant set is fixed when the vector is built. Each entry is an
//! atomic, so single-entry reads and writes never tear, but `update_max` and
//! `merge_min` walk the entries one at a time and are not atomic as a whole.

use super::timestamp::{ReplicaId, SeqNum, Timestamp, NULL_SEQ_NUMBER};
use super::{check_unique, TsaeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Summary of the last timestamp recorded from each participant.
#[derive(Debug, Serialize, Deserialize)]
#[serde(into = "BTreeMap<ReplicaId, SeqNum>", from = "BTreeMap<ReplicaId, SeqNum>")]
pub struct TimestampVector {
    /// Map from participant to the sequence number of its last timestamp
    entries: BTreeMap<ReplicaId, AtomicI64>,
}

impl TimestampVector {
    /// Create a vector with a null entry for every participant
    pub fn new(participants: &[ReplicaId]) -> Result<Self, TsaeError> {
        check_unique(participants)?;
        let entries = participants
            .iter()
            .map(|id| (id.clone(), AtomicI64::new(NULL_SEQ_NUMBER)))
            .collect();
        Ok(Self { entries })
    }

    fn seq_of(&self, replica: &str) -> Option<SeqNum> {
        self.entries
            .get(replica)
            .map(|slot| slot.load(Ordering::Acquire))
    }

    /// Record a timestamp if it is newer than what we have for its origin.
    ///
    /// Timestamps from replicas outside this vector are ignored.
    pub fn update_timestamp(&self, timestamp: &Timestamp) {
        log::trace!("Updating timestamp vector with {}", timestamp);

        if let Some(slot) = self.entries.get(timestamp.host_id()) {
            slot.fetch_max(timestamp.seq_number(), Ordering::AcqRel);
        }
    }

    /// Merge another vector into this one, taking the max of each entry.
    ///
    /// Only participants of this vector are considered.
    pub fn update_max(&self, other: &TimestampVector) {
        for (replica, slot) in &self.entries {
            if let Some(theirs) = other.seq_of(replica) {
                slot.fetch_max(theirs, Ordering::AcqRel);
            }
        }
    }

    /// Merge another vector into this one, taking the min of each entry.
    ///
    /// A null local entry adopts the other value as-is, even when that value
    /// is non-null. A null value in `other` never replaces a non-null one.
    pub fn merge_min(&self, other: &TimestampVector) {
        for (replica, slot) in &self.entries {
            let Some(theirs) = other.seq_of(replica) else {
                continue;
            };
            // Err only means "keep the local value"
            let _ = slot.fetch_update(Ordering::AcqRel, Ordering::Acquire, |mine| {
                if mine == NULL_SEQ_NUMBER {
                    (theirs != mine).then_some(theirs)
                } else if theirs != NULL_SEQ_NUMBER && theirs < mine {
                    Some(theirs)
                } else {
                    None
                }
            });
        }
    }

    /// Last timestamp recorded for a participant.
    ///
    /// Returns None when the replica is not a participant of this vector,
    /// and a null timestamp when it is known but nothing has been seen yet.
    pub fn get_last(&self, replica: &str) -> Option<Timestamp> {
        self.seq_of(replica).map(|seq| Timestamp::new(replica, seq))
    }

    /// All participants, in id order
    pub fn participants(&self) -> impl Iterator<Item = &ReplicaId> {
        self.entries.keys()
    }

    /// Point-in-time copy of every entry
    pub fn snapshot(&self) -> BTreeMap<ReplicaId, SeqNum> {
        self.entries
            .iter()
            .map(|(id, slot)| (id.clone(), slot.load(Ordering::Acquire)))
            .collect()
    }
}

impl Clone for TimestampVector {
    fn clone(&self) -> Self {
        Self::from(self.snapshot())
    }
}

impl PartialEq for TimestampVector {
    fn eq(&self, other: &Self) -> bool {
        self.snapshot() == other.snapshot()
    }
}

impl Eq for TimestampVector {}

impl From<BTreeMap<ReplicaId, SeqNum>> for TimestampVector {
    fn from(seen: BTreeMap<ReplicaId, SeqNum>) -> Self {
        let entries = seen
            .into_iter()
            .map(|(id, seq)| (id, AtomicI64::new(seq.max(NULL_SEQ_NUMBER))))
            .collect();
        Self { entries }
    }
}

impl From<TimestampVector> for BTreeMap<ReplicaId, SeqNum> {
    fn from(vector: TimestampVector) -> Self {
        vector.snapshot()
    }
}

impl fmt::Display for TimestampVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (replica, seq) in self.snapshot() {
            writeln!(f, "{}", Timestamp::new(replica, seq))?;
        }
        Ok(())
    }
}
