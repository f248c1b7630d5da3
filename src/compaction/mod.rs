//! Compaction Module
//!
//! Leveled compaction: choosing what to merge, merging it into new tables,
//! and the background worker that runs flushes and compactions.
//!
//! ## Picking
//! ```text
//! score(L0) = files / level0_compaction_trigger
//! score(Ln) = bytes / (base_level_size * multiplier^(n-1))
//! ```
//! The level with the highest score `>= 1` is compacted. Deeper levels pick
//! their input round robin, starting after the level's compact pointer;
//! level-0 inputs grow to every overlapping level-0 file.

mod job;
mod worker;

pub(crate) use job::{build_table, run_compaction};
pub(crate) use worker::{BackgroundWork, Task, Worker};

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::config::NUM_LEVELS;
use crate::key::{compare_internal, user_key};
use crate::version::{FileMetaData, Version, VersionEdit, VersionSet};

/// One compaction: files of `level` merged with the overlapping files of
/// `level + 1`, written out to `level + 1`
#[derive(Debug)]
pub struct Compaction {
    level: usize,
    inputs: [Vec<Arc<FileMetaData>>; 2],
    version: Arc<Version>,
    max_output_file_size: u64,
    manual: bool,
    edit: VersionEdit,
}

impl Compaction {
    fn new(
        level: usize,
        inputs0: Vec<Arc<FileMetaData>>,
        version: Arc<Version>,
        max_output_file_size: u64,
        manual: bool,
    ) -> Self {
        let (smallest, largest) = key_range(&inputs0);
        let inputs1 = if level + 1 < NUM_LEVELS {
            version.overlapping_files(
                level + 1,
                Some(user_key(&smallest)),
                Some(user_key(&largest)),
            )
        } else {
            Vec::new()
        };

        // The next compaction of this level starts after this one
        let mut edit = VersionEdit::new();
        edit.set_compact_pointer(level, largest);

        Self {
            level,
            inputs: [inputs0, inputs1],
            version,
            max_output_file_size,
            manual,
            edit,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// `which` is 0 for the files of `level`, 1 for those of `level + 1`
    pub fn inputs(&self, which: usize) -> &[Arc<FileMetaData>] {
        &self.inputs[which]
    }

    pub fn num_input_files(&self) -> usize {
        self.inputs[0].len() + self.inputs[1].len()
    }

    pub fn input_bytes(&self) -> u64 {
        self.inputs.iter().flatten().map(|f| f.file_size).sum()
    }

    pub fn max_output_file_size(&self) -> u64 {
        self.max_output_file_size
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// A single input file with nothing to merge against moves down a level
    /// without being rewritten
    ///
    /// Manual compactions always rewrite, so they can reclaim space.
    pub fn is_trivial_move(&self) -> bool {
        !self.manual && self.inputs[0].len() == 1 && self.inputs[1].is_empty()
    }

    /// Whether no level below the output level can hold `user_key`
    ///
    /// A tombstone for such a key shadows nothing once it is compacted.
    pub fn is_base_level_for_key(&self, key: &[u8]) -> bool {
        for level in self.level + 2..NUM_LEVELS {
            let files = self.version.files(level);
            let index = files.partition_point(|f| f.largest_user_key() < key);
            if let Some(file) = files.get(index) {
                if file.smallest_user_key() <= key {
                    return false;
                }
            }
        }
        true
    }

    /// Edit that retires the inputs; outputs are added by the caller
    pub fn take_edit(&mut self) -> VersionEdit {
        let mut edit = std::mem::take(&mut self.edit);
        for (which, files) in self.inputs.iter().enumerate() {
            for file in files {
                edit.delete_file(self.level + which, file.number);
            }
        }
        edit
    }
}

/// Smallest and largest internal key over `files`
fn key_range(files: &[Arc<FileMetaData>]) -> (Vec<u8>, Vec<u8>) {
    let mut smallest: Option<&[u8]> = None;
    let mut largest: Option<&[u8]> = None;
    for file in files {
        if smallest.map_or(true, |s| compare_internal(&file.smallest, s) == Ordering::Less) {
            smallest = Some(&file.smallest);
        }
        if largest.map_or(true, |l| compare_internal(&file.largest, l) == Ordering::Greater) {
            largest = Some(&file.largest);
        }
    }
    (
        smallest.unwrap_or_default().to_vec(),
        largest.unwrap_or_default().to_vec(),
    )
}

/// The compaction most in need of running, if any level is over budget
pub fn pick_compaction(versions: &VersionSet) -> Option<Compaction> {
    let version = versions.current();
    if version.compaction_score() < 1.0 {
        return None;
    }

    let level = version.compaction_level();
    let files = version.files(level);
    if files.is_empty() {
        return None;
    }

    // Round robin: first file past the compact pointer, wrapping around
    let pointer = versions.compact_pointer(level);
    let first = files
        .iter()
        .find(|f| pointer.is_empty() || compare_internal(&f.largest, pointer) == Ordering::Greater)
        .unwrap_or(&files[0]);

    let mut inputs0 = vec![Arc::clone(first)];
    if level == 0 {
        inputs0 = version.overlapping_files(
            0,
            Some(first.smallest_user_key()),
            Some(first.largest_user_key()),
        );
    }

    let max_file_size = versions.config().max_file_size;
    Some(Compaction::new(level, inputs0, version, max_file_size, false))
}

/// Compaction of every file at `level` that overlaps `[begin, end]`
pub fn range_compaction(
    versions: &VersionSet,
    level: usize,
    begin: Option<&[u8]>,
    end: Option<&[u8]>,
) -> Option<Compaction> {
    if level + 1 >= NUM_LEVELS {
        return None;
    }
    let version = versions.current();
    let inputs0 = version.overlapping_files(level, begin, end);
    if inputs0.is_empty() {
        return None;
    }
    let max_file_size = versions.config().max_file_size;
    Some(Compaction::new(level, inputs0, version, max_file_size, true))
}

/// Time, input and output volume of the compactions run at one level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionStats {
    pub duration: Duration,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub count: u64,
}

impl CompactionStats {
    pub fn add(&mut self, other: &CompactionStats) {
        self.duration += other.duration;
        self.bytes_read += other.bytes_read;
        self.bytes_written += other.bytes_written;
        self.count += other.count;
    }
}
