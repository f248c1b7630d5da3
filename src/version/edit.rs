//! Version edits
//!
//! One edit describes the difference between two consecutive versions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::FileMetaData;
use crate::error::Result;
use crate::key::SequenceNumber;

/// Name of the only key ordering tables are written with
pub const COMPARATOR_NAME: &str = "stratakv.InternalKeyComparator";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEdit {
    pub comparator: Option<String>,

    /// WAL files with a lower number are no longer needed
    pub log_number: Option<u64>,

    pub prev_log_number: Option<u64>,

    pub next_file_number: Option<u64>,

    /// Highest sequence number durable in table files
    pub last_sequence: Option<SequenceNumber>,

    /// (level, internal key) where the next compaction of a level starts
    pub compact_pointers: Vec<(usize, Vec<u8>)>,

    /// (level, file number)
    pub deleted_files: BTreeSet<(usize, u64)>,

    pub new_files: Vec<(usize, FileMetaData)>,
}

impl VersionEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_comparator(&mut self, name: &str) {
        self.comparator = Some(name.to_string());
    }

    pub fn set_log_number(&mut self, number: u64) {
        self.log_number = Some(number);
    }

    pub fn set_prev_log_number(&mut self, number: u64) {
        self.prev_log_number = Some(number);
    }

    pub fn set_next_file_number(&mut self, number: u64) {
        self.next_file_number = Some(number);
    }

    pub fn set_last_sequence(&mut self, sequence: SequenceNumber) {
        self.last_sequence = Some(sequence);
    }

    pub fn set_compact_pointer(&mut self, level: usize, key: Vec<u8>) {
        self.compact_pointers.push((level, key));
    }

    pub fn add_file(&mut self, level: usize, file: FileMetaData) {
        self.new_files.push((level, file));
    }

    pub fn delete_file(&mut self, level: usize, number: u64) {
        self.deleted_files.insert((level, number));
    }

    /// Whether the edit changes the set of files
    pub fn changes_files(&self) -> bool {
        !self.new_files.is_empty() || !self.deleted_files.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
