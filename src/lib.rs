// TSAE - Timestamped anti-entropy replication core

pub mod config;
pub mod operation;
pub mod session;
pub mod sync;
pub mod tsae;

pub use config::ReplicaConfig;
pub use operation::{OpKind, Operation};
pub use session::{exchange, Replica};
pub use sync::SyncMessage;
pub use tsae::{
    ReplicaId, ReplicatedLog, SeqNum, Sequencing, Timestamp, TimestampMatrix, TimestampVector,
    Timestamped, TsaeError, NULL_SEQ_NUMBER,
};
