//! Anti-entropy sync messages
//!
//! Serialized with CBOR (`ciborium`) for transmission; JSON is available for
//! inspection and debugging.

use serde::{Deserialize, Serialize};

use crate::operation::Operation;
use crate::tsae::{ReplicaId, TimestampMatrix, TimestampVector, TsaeError};

/// Messages exchanged between two replicas during an anti-entropy session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// "This is what I have recorded, and what I believe everyone has"
    Summary {
        from: ReplicaId,
        summary: TimestampVector,
        ack: TimestampMatrix,
    },
    /// Operations the receiver's summary showed it was missing
    Operations { from: ReplicaId, ops: Vec<Operation> },
}

impl SyncMessage {
    /// The replica that sent this message
    pub fn sender(&self) -> &str {
        match self {
            SyncMessage::Summary { from, .. } => from,
            SyncMessage::Operations { from, .. } => from,
        }
    }

    /// Serialize to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, TsaeError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| TsaeError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_cbor(data: &[u8]) -> Result<Self, TsaeError> {
        ciborium::from_reader(data).map_err(|e| TsaeError::Deserialization(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, TsaeError> {
        serde_json::to_string_pretty(self).map_err(|e| TsaeError::Serialization(e.to_string()))
    }

    pub fn from_json(data: &str) -> Result<Self, TsaeError> {
        serde_json::from_str(data).map_err(|e| TsaeError::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OpKind;
    use crate::tsae::Timestamp;

    fn participants() -> Vec<ReplicaId> {
        vec!["A".to_string(), "B".to_string()]
    }

    #[test]
    fn test_summary_cbor_round_trip() {
        let summary = TimestampVector::new(&participants()).unwrap();
        summary.update_timestamp(&Timestamp::new("A", 12));
        let ack = TimestampMatrix::new(&participants()).unwrap();
        ack.update("A", &summary);

        let msg = SyncMessage::Summary {
            from: "A".into(),
            summary,
            ack,
        };

        let bytes = msg.to_cbor().unwrap();
        let restored = SyncMessage::from_cbor(&bytes).unwrap();
        assert_eq!(msg, restored);
        assert_eq!(restored.sender(), "A");
    }

    #[test]
    fn test_operations_json_round_trip() {
        let msg = SyncMessage::Operations {
            from: "B".into(),
            ops: vec![
                Operation::at("B", 0, OpKind::put("x", "1")),
                Operation::at("B", 1, OpKind::remove("x")),
            ],
        };

        let json = msg.to_json().unwrap();
        let restored = SyncMessage::from_json(&json).unwrap();
        assert_eq!(msg, restored);
    }

    #[test]
    fn test_from_cbor_rejects_garbage() {
        assert!(matches!(
            SyncMessage::from_cbor(&[0xff, 0x00, 0x13]),
            Err(TsaeError::Deserialization(_))
        ));
    }
}
