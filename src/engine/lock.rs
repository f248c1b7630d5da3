//! Exclusive `LOCK` file held for the lifetime of an open engine

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use crate::error::{Result, StrataError};
use crate::filename::LOCK;

pub(crate) struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    /// Take the OS lock on `{dir}/LOCK`, failing with `Locked` if another
    /// handle holds it
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK);
        tracing::debug!(path = %path.display(), "Acquiring database lock");

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        file.try_lock().map_err(|e| match e {
            TryLockError::Error(e) => StrataError::Io(e),
            TryLockError::WouldBlock => StrataError::Locked(dir.display().to_string()),
        })?;

        Ok(Self { file, path })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "Releasing database lock");
        if let Err(e) = self.file.unlock() {
            tracing::warn!(error = %e, "Failed to release database lock");
        }
    }
}
