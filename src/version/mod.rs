//! Version Module
//!
//! Tracks which table files make up the database at each level.
//!
//! ## Responsibilities
//! - Immutable `Version`s: the files per level at one point in time
//! - `VersionEdit`s: add/remove files, advance the log and sequence watermarks
//! - The manifest: a framed log of edits, replayed on open
//! - Keep every version alive while a reader holds it, so that table files
//!   are only deleted once nothing references them
//!
//! ## Manifest Format
//! ```text
//! ┌─────────┬─────────┬──────────────────────────┐
//! │ CRC (4) │ Len (4) │ VersionEdit (bincode)    │
//! └─────────┴─────────┴──────────────────────────┘
//!   ... repeated; the first edit is a full snapshot ...
//! ```
//! `CURRENT` names the live manifest.

mod edit;
mod level_iter;
mod levels;
mod set;

use serde::{Deserialize, Serialize};

pub use edit::VersionEdit;
pub use level_iter::LevelIterator;
pub use levels::Version;
pub use set::VersionSet;

use crate::key::user_key;

/// Metadata of one table file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    pub number: u64,
    pub file_size: u64,
    /// Smallest internal key
    pub smallest: Vec<u8>,
    /// Largest internal key
    pub largest: Vec<u8>,
}

impl FileMetaData {
    pub fn smallest_user_key(&self) -> &[u8] {
        user_key(&self.smallest)
    }

    pub fn largest_user_key(&self) -> &[u8] {
        user_key(&self.largest)
    }

    /// Whether the file's user-key range intersects `[begin, end]`
    ///
    /// `None` bounds are open.
    pub fn overlaps(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> bool {
        let after_end = end.is_some_and(|end| self.smallest_user_key() > end);
        let before_begin = begin.is_some_and(|begin| self.largest_user_key() < begin);
        !after_end && !before_begin
    }
}
