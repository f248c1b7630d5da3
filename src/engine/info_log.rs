//! Human-readable event log kept next to the data (`LOG`)
//!
//! One timestamped line per open, flush, compaction and background failure.
//! The previous log is kept as `LOG.old`.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::error::Result;
use crate::filename::{INFO_LOG, INFO_LOG_OLD};

pub(crate) struct InfoLog {
    writer: Mutex<BufWriter<File>>,
}

impl InfoLog {
    pub fn open(dir: &Path) -> Result<Self> {
        let path = dir.join(INFO_LOG);
        if path.exists() {
            fs::rename(&path, dir.join(INFO_LOG_OLD))?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Append one line; failures are reported through tracing only
    pub fn log(&self, message: fmt::Arguments<'_>) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        let mut writer = self.writer.lock();
        let result = writeln!(
            writer,
            "{}.{:06} {}",
            now.as_secs(),
            now.subsec_micros(),
            message
        )
        .and_then(|_| writer.flush());

        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write info log");
        }
    }
}
