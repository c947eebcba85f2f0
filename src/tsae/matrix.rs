//! Timestamp matrices
//!
//! One TimestampVector per participant: row `r` is what this replica
//! believes `r` has received. The pointwise minimum over all rows is what
//! every replica has acknowledged, which is the bound log compaction needs.

use super::timestamp::ReplicaId;
use super::vector::TimestampVector;
use super::{check_unique, TsaeError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampMatrix {
    rows: BTreeMap<ReplicaId, TimestampVector>,
}

impl TimestampMatrix {
    /// Create a matrix of all-null vectors, one row per participant
    pub fn new(participants: &[ReplicaId]) -> Result<Self, TsaeError> {
        check_unique(participants)?;
        let mut rows = BTreeMap::new();
        for id in participants {
            rows.insert(id.clone(), TimestampVector::new(participants)?);
        }
        Ok(Self { rows })
    }

    /// The row for a replica
    pub fn get(&self, replica: &str) -> Option<&TimestampVector> {
        self.rows.get(replica)
    }

    /// Merge a replica's summary into its row. Returns false for an unknown replica.
    pub fn update(&self, replica: &str, summary: &TimestampVector) -> bool {
        match self.rows.get(replica) {
            Some(row) => {
                row.update_max(summary);
                true
            }
            None => false,
        }
    }

    /// Row-wise max with another matrix
    pub fn update_max(&self, other: &TimestampMatrix) {
        for (replica, row) in &self.rows {
            if let Some(theirs) = other.rows.get(replica) {
                row.update_max(theirs);
            }
        }
    }

    /// Pointwise minimum over all rows (`merge_min` folded from the first row).
    ///
    /// Inherits `merge_min`'s rule that a null entry adopts the next row's
    /// value, so a replica that has reported nothing does not pin the
    /// result to null. None for a matrix with no rows.
    pub fn min_timestamp_vector(&self) -> Option<TimestampVector> {
        let mut rows = self.rows.values();
        let min = rows.next()?.clone();
        for row in rows {
            min.merge_min(row);
        }
        Some(min)
    }
}
