//! Replica configuration
//!
//! Membership is fixed: the participant list is read once at startup and
//! handed to every structure that needs it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::tsae::{check_unique, ReplicaId, Sequencing, TsaeError};

/// Identity of the local replica plus the fixed group it belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// This replica's id; must be one of `participants`
    pub local_id: ReplicaId,

    /// Every replica in the group, including this one
    pub participants: Vec<ReplicaId>,

    /// Gap policy for incoming operations
    #[serde(default)]
    pub sequencing: Sequencing,
}

impl ReplicaConfig {
    pub fn new(local_id: impl Into<ReplicaId>, participants: Vec<ReplicaId>) -> Self {
        Self {
            local_id: local_id.into(),
            participants,
            sequencing: Sequencing::default(),
        }
    }

    pub fn with_sequencing(mut self, sequencing: Sequencing) -> Self {
        self.sequencing = sequencing;
        self
    }

    /// Check the participant list and local id
    pub fn validate(&self) -> Result<(), TsaeError> {
        if self.participants.is_empty() {
            return Err(TsaeError::EmptyParticipants);
        }
        check_unique(&self.participants)?;
        if !self.participants.contains(&self.local_id) {
            return Err(TsaeError::UnknownParticipant(self.local_id.clone()));
        }
        Ok(())
    }

    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, TsaeError> {
        let config: ReplicaConfig = serde_json::from_str(json)
            .map_err(|e| TsaeError::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: &Path) -> Result<Self, TsaeError> {
        let data = std::fs::read_to_string(path).map_err(|e| TsaeError::Io(e.to_string()))?;
        Self::from_json(&data)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), TsaeError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TsaeError::Serialization(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| TsaeError::Io(e.to_string()))
    }
}
