//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::frame::{Frame, FrameReader};
use super::WalEntry;
use crate::error::{Result, StrataError};

/// What the reader found when it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stop {
    /// End of file after a complete record
    Clean,

    /// An incomplete or unverifiable final record starting at `offset`
    TornTail { offset: u64 },
}

/// Reads entries from the WAL file
pub struct WalReader {
    frames: FrameReader<BufReader<File>>,
    stop: Option<Stop>,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            frames: FrameReader::new(BufReader::new(file), 0, len),
            stop: None,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at the end of the log, including when the last
    /// record was torn by a crash. A damaged record followed by more data is
    /// reported as `Corruption`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        if self.stop.is_some() {
            return Ok(None);
        }

        match self.frames.next_frame()? {
            Frame::Record(payload) => {
                let entry = WalEntry::deserialize(&payload).map_err(|e| {
                    StrataError::corruption(format!(
                        "undecodable WAL record before offset {}: {}",
                        self.frames.offset(),
                        e
                    ))
                })?;
                Ok(Some(entry))
            }
            Frame::End => {
                self.stop = Some(Stop::Clean);
                Ok(None)
            }
            Frame::TornTail { offset } => {
                self.stop = Some(Stop::TornTail { offset });
                Ok(None)
            }
            Frame::Corrupt { offset, reason } => Err(StrataError::corruption(format!(
                "{} at offset {} of WAL",
                reason, offset
            ))),
        }
    }

    /// Where reading stopped, once `next_entry` has returned `None`
    pub(crate) fn stop(&self) -> Option<Stop> {
        self.stop
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator { reader: self }
    }
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_entry().transpose()
    }
}
