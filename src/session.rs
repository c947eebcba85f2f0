//! In-process anti-entropy endpoint
//!
//! A Replica bundles the structures one replica keeps: its log, the summary
//! of what it has recorded, and the acknowledgement matrix of what it
//! believes everyone else has. It is what the CLI simulation and the
//! integration tests drive; there is no transport here.

use std::sync::{Mutex, PoisonError};

use crate::config::ReplicaConfig;
use crate::operation::{OpKind, Operation};
use crate::sync::SyncMessage;
use crate::tsae::{
    ReplicaId, ReplicatedLog, SeqNum, TimestampMatrix, TimestampVector, Timestamped, TsaeError,
};

pub struct Replica {
    id: ReplicaId,
    log: ReplicatedLog<Operation>,
    summary: TimestampVector,
    ack: TimestampMatrix,
    /// Next local sequence number; held while a local op is appended
    next_seq: Mutex<SeqNum>,
}

impl Replica {
    pub fn new(config: &ReplicaConfig) -> Result<Self, TsaeError> {
        config.validate()?;
        Ok(Self {
            id: config.local_id.clone(),
            log: ReplicatedLog::with_sequencing(&config.participants, config.sequencing)?,
            summary: TimestampVector::new(&config.participants)?,
            ack: TimestampMatrix::new(&config.participants)?,
            next_seq: Mutex::new(0),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log(&self) -> &ReplicatedLog<Operation> {
        &self.log
    }

    pub fn summary(&self) -> &TimestampVector {
        &self.summary
    }

    pub fn ack(&self) -> &TimestampMatrix {
        &self.ack
    }

    /// Issue a local operation with the next sequence number.
    ///
    /// The counter lock is held across the append so local operations reach
    /// the log in sequence order. The counter never falls behind the tail of
    /// our own stream, which peers may have refilled with our earlier history.
    pub fn generate(&self, kind: OpKind) -> Result<Operation, TsaeError> {
        let mut next_seq = self.next_seq.lock().unwrap_or_else(PoisonError::into_inner);

        let after_tail = match self.log.last_timestamp(&self.id) {
            Some(tail) => tail
                .next()
                .ok_or_else(|| TsaeError::SequenceExhausted(self.id.clone()))?
                .seq_number(),
            None => 0,
        };
        let seq = (*next_seq).max(after_tail);

        let op = Operation::at(self.id.clone(), seq, kind);
        if !self.log.add(op.clone()) {
            return Err(TsaeError::Rejected(op.to_string()));
        }

        *next_seq = seq
            .checked_add(1)
            .ok_or_else(|| TsaeError::SequenceExhausted(self.id.clone()))?;
        self.record(&op);
        Ok(op)
    }

    fn record(&self, op: &Operation) {
        self.summary.update_timestamp(op.timestamp());
        self.ack.update(&self.id, &self.summary);
    }

    /// The summary advertised to peers
    pub fn summary_message(&self) -> SyncMessage {
        SyncMessage::Summary {
            from: self.id.clone(),
            summary: self.summary.clone(),
            ack: self.ack.clone(),
        }
    }

    /// Operations a peer with the given summary has not seen
    pub fn missing_for(&self, summary: &TimestampVector) -> Vec<Operation> {
        self.log.list_newer(summary)
    }

    /// Apply operations from a peer. Returns how many were new.
    pub fn receive_operations(&self, ops: impl IntoIterator<Item = Operation>) -> usize {
        let mut accepted = 0;
        for op in ops {
            let ts = op.timestamp().clone();
            if self.log.add(op) {
                self.summary.update_timestamp(&ts);
                accepted += 1;
            }
        }
        self.ack.update(&self.id, &self.summary);
        accepted
    }

    /// Fold a peer's summary and acknowledgements into ours
    pub fn receive_summary(&self, from: &str, summary: &TimestampVector, ack: &TimestampMatrix) {
        self.ack.update_max(ack);
        if !self.ack.update(from, summary) {
            log::warn!("Summary from unknown replica {}", from);
        }
        self.log.purge_log(&self.ack);
    }

    /// Apply a message from a peer. Returns the number of new operations.
    pub fn handle_message(&self, msg: SyncMessage) -> usize {
        match msg {
            SyncMessage::Summary { from, summary, ack } => {
                self.receive_summary(&from, &summary, &ack);
                0
            }
            SyncMessage::Operations { from, ops } => {
                let accepted = self.receive_operations(ops);
                log::debug!("{} accepted {} operations from {}", self.id, accepted, from);
                accepted
            }
        }
    }

    /// Reply to a peer's summary with the operations it is missing
    pub fn operations_for(&self, summary: &TimestampVector) -> SyncMessage {
        SyncMessage::Operations {
            from: self.id.clone(),
            ops: self.missing_for(summary),
        }
    }
}

/// Move a message through its wire form
fn transmit(msg: &SyncMessage) -> Result<SyncMessage, TsaeError> {
    SyncMessage::from_cbor(&msg.to_cbor()?)
}

fn summary_of(msg: &SyncMessage) -> Result<&TimestampVector, TsaeError> {
    match msg {
        SyncMessage::Summary { summary, .. } => Ok(summary),
        SyncMessage::Operations { from, .. } => Err(TsaeError::Deserialization(format!(
            "expected a summary from {}, got operations",
            from
        ))),
    }
}

/// One bidirectional anti-entropy step between two replicas.
///
/// Both sides swap summaries, ship each other what the other is missing,
/// and then swap the updated summaries so acknowledgements catch up.
/// Messages go through their CBOR form. Returns the operations each side accepted.
pub fn exchange(a: &Replica, b: &Replica) -> Result<(usize, usize), TsaeError> {
    let summary_a = transmit(&a.summary_message())?;
    let summary_b = transmit(&b.summary_message())?;

    let to_b = a.operations_for(summary_of(&summary_b)?);
    let to_a = b.operations_for(summary_of(&summary_a)?);

    a.handle_message(summary_b);
    b.handle_message(summary_a);

    let accepted_by_b = b.handle_message(transmit(&to_b)?);
    let accepted_by_a = a.handle_message(transmit(&to_a)?);

    a.handle_message(transmit(&b.summary_message())?);
    b.handle_message(transmit(&a.summary_message())?);

    Ok((accepted_by_a, accepted_by_b))
}
