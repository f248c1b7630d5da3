//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use super::reader::Stop;
use super::{WalEntry, WalReader};
use crate::error::{Result, StrataError};
use crate::key::SequenceNumber;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Entries skipped because they were already durable in a table
    pub entries_skipped: u64,

    /// Highest sequence number seen in a valid entry
    pub last_sequence: SequenceNumber,

    /// Whether the WAL was truncated (partial writes removed)
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Replay every entry of a WAL file that is newer than `watermark`
    ///
    /// This will:
    /// 1. Read all valid entries in order
    /// 2. Skip entries whose sequences are all `<= watermark`
    /// 3. Truncate a torn record at the end (unless `paranoid`)
    /// 4. Fail with `Corruption` on damage in the middle of the file
    pub fn replay<F>(
        path: &Path,
        watermark: SequenceNumber,
        paranoid: bool,
        mut apply: F,
    ) -> Result<RecoveryResult>
    where
        F: FnMut(WalEntry) -> Result<()>,
    {
        let mut result = RecoveryResult::default();
        let mut reader = WalReader::open(path)?;

        while let Some(entry) = reader.next_entry()? {
            result.last_sequence = result.last_sequence.max(entry.last_sequence());

            if entry.last_sequence() <= watermark {
                result.entries_skipped += 1;
                continue;
            }

            apply(entry)?;
            result.entries_recovered += 1;
        }

        if let Some(Stop::TornTail { offset }) = reader.stop() {
            if paranoid {
                return Err(StrataError::corruption(format!(
                    "torn record at offset {} in {}",
                    offset,
                    path.display()
                )));
            }

            tracing::warn!(
                path = %path.display(),
                offset,
                "Truncating torn record at WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(offset)?;
            file.sync_all()?;
            result.was_truncated = true;
        }

        Ok(result)
    }

    /// Recover all entries from a WAL file
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let result = Self::replay(path, 0, false, |entry| {
            entries.push(entry);
            Ok(())
        })?;
        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let mut result = RecoveryResult::default();
        let mut reader = WalReader::open(path)?;

        while let Some(entry) = reader.next_entry()? {
            result.last_sequence = result.last_sequence.max(entry.last_sequence());
            result.entries_recovered += 1;
        }
        result.was_truncated = matches!(reader.stop(), Some(Stop::TornTail { .. }));

        Ok(result)
    }
}
