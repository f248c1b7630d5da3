//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::frame::write_frame;
use super::WalEntry;
use crate::error::Result;

/// Writes entries to one WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    entries_written: u64,
}

impl WalWriter {
    /// Open a WAL file for appending, creating it if needed
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let bytes_written = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            bytes_written,
            entries_written: 0,
        })
    }

    /// Append an entry to the WAL
    ///
    /// The record is always handed to the OS before returning; with `sync`
    /// it is also forced to stable storage.
    pub fn append(&mut self, entry: &WalEntry, sync: bool) -> Result<()> {
        let payload = entry.serialize()?;
        let written = write_frame(&mut self.writer, &payload)?;
        self.writer.flush()?;

        if sync {
            self.writer.get_ref().sync_data()?;
        }

        self.bytes_written += written as u64;
        self.entries_written += 1;
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file in bytes
    pub fn len(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_written == 0
    }

    /// Entries appended through this writer
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }
}
