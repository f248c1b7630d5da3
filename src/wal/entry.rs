//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries. One entry carries a
//! whole write batch so that a batch is either replayed completely or not
//! at all.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::SequenceNumber;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Sequence number of the first operation; the batch occupies
    /// `sequence .. sequence + operations.len()`
    pub sequence: SequenceNumber,

    /// The operations to apply, in order
    pub operations: Vec<Operation>,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Operation {
    pub fn key(&self) -> &[u8] {
        match self {
            Operation::Put { key, .. } | Operation::Delete { key } => key,
        }
    }

    /// Bytes this operation contributes to a memtable
    pub fn approximate_size(&self) -> usize {
        match self {
            Operation::Put { key, value } => key.len() + value.len(),
            Operation::Delete { key } => key.len(),
        }
    }
}

impl WalEntry {
    pub fn new(sequence: SequenceNumber, operations: Vec<Operation>) -> Self {
        Self {
            sequence,
            operations,
        }
    }

    /// Highest sequence number used by this entry
    pub fn last_sequence(&self) -> SequenceNumber {
        self.sequence + (self.operations.len() as u64).saturating_sub(1)
    }

    /// Encode the record payload (framing is added by the writer)
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
