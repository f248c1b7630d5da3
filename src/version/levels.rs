//! Version: the immutable set of table files per level

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::{FileMetaData, LevelIterator, VersionEdit};
use crate::config::{Config, NUM_LEVELS};
use crate::error::{Result, StrataError};
use crate::iterator::BoxedIterator;
use crate::key::{compare_internal, parse_internal_key, user_key, LookupResult, SequenceNumber};
use crate::table::TableCache;

/// Files per level at one point in time
///
/// Level 0 is ordered by file number (newest last) and may overlap. Levels
/// 1 and up are ordered by smallest key and never overlap.
#[derive(Debug, Clone)]
pub struct Version {
    files: [Vec<Arc<FileMetaData>>; NUM_LEVELS],

    /// Level most in need of compaction, and how badly (>= 1 means due)
    compaction_level: usize,
    compaction_score: f64,
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

impl Version {
    pub fn new() -> Self {
        Self {
            files: Default::default(),
            compaction_level: 0,
            compaction_score: 0.0,
        }
    }

    pub fn files(&self, level: usize) -> &[Arc<FileMetaData>] {
        &self.files[level]
    }

    pub fn num_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    pub fn level_bytes(&self, level: usize) -> u64 {
        self.files[level].iter().map(|f| f.file_size).sum()
    }

    pub fn total_files(&self) -> usize {
        self.files.iter().map(Vec::len).sum()
    }

    pub fn compaction_score(&self) -> f64 {
        self.compaction_score
    }

    pub fn compaction_level(&self) -> usize {
        self.compaction_level
    }

    /// Add the numbers of every referenced file to `live`
    pub fn add_live_files(&self, live: &mut HashSet<u64>) {
        for level in &self.files {
            live.extend(level.iter().map(|f| f.number));
        }
    }

    /// Derive the next version by applying `edit`
    pub(crate) fn apply(&self, edit: &VersionEdit, config: &Config) -> Result<Version> {
        let mut next = Version::new();

        for (level, files) in self.files.iter().enumerate() {
            next.files[level] = files
                .iter()
                .filter(|f| !edit.deleted_files.contains(&(level, f.number)))
                .cloned()
                .collect();
        }

        for (level, file) in &edit.new_files {
            let level = *level;
            if level >= NUM_LEVELS {
                return Err(StrataError::corruption(format!(
                    "edit adds file {} to level {}",
                    file.number, level
                )));
            }
            if edit.deleted_files.contains(&(level, file.number)) {
                continue;
            }
            next.files[level].push(Arc::new(file.clone()));
        }

        next.files[0].sort_by_key(|f| f.number);
        for level in 1..NUM_LEVELS {
            next.files[level].sort_by(|a, b| compare_internal(&a.smallest, &b.smallest));
            for pair in next.files[level].windows(2) {
                if compare_internal(&pair[0].largest, &pair[1].smallest) != Ordering::Less {
                    return Err(StrataError::corruption(format!(
                        "overlapping files {} and {} at level {}",
                        pair[0].number, pair[1].number, level
                    )));
                }
            }
        }

        next.finalize(config);
        Ok(next)
    }

    /// Compute the compaction score of every level
    ///
    /// Level 0 is scored by file count, since every file there is read on
    /// each lookup; deeper levels by bytes against their budget.
    fn finalize(&mut self, config: &Config) {
        let mut best_level = 0;
        let mut best_score = -1.0;

        for level in 0..NUM_LEVELS - 1 {
            let score = if level == 0 {
                self.files[0].len() as f64 / config.level0_compaction_trigger.max(1) as f64
            } else {
                self.level_bytes(level) as f64 / config.max_bytes_for_level(level) as f64
            };

            if score > best_score {
                best_level = level;
                best_score = score;
            }
        }

        self.compaction_level = best_level;
        self.compaction_score = best_score;
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Newest entry for the user key of `lookup` at or below its sequence
    ///
    /// Every overlapping level-0 file is consulted and the highest sequence
    /// wins, since repair may leave level-0 numbers out of sequence order.
    /// Deeper levels hold at most one candidate file each.
    pub fn get(
        &self,
        lookup: &[u8],
        table_cache: &TableCache,
        fill_cache: bool,
    ) -> Result<Option<LookupResult>> {
        let target = user_key(lookup);

        let mut newest: Option<(u64, LookupResult)> = None;
        for file in self.files[0].iter().rev() {
            if target < file.smallest_user_key() || target > file.largest_user_key() {
                continue;
            }
            if let Some((sequence, found)) =
                Self::search_file(file, lookup, table_cache, fill_cache)?
            {
                if newest.as_ref().map_or(true, |(best, _)| sequence > *best) {
                    newest = Some((sequence, found));
                }
            }
        }
        if let Some((_, found)) = newest {
            return Ok(Some(found));
        }

        for level in 1..NUM_LEVELS {
            let files = &self.files[level];
            let index = find_file(files, lookup);
            let Some(file) = files.get(index) else {
                continue;
            };
            if target < file.smallest_user_key() {
                continue;
            }
            if let Some((_, found)) = Self::search_file(file, lookup, table_cache, fill_cache)? {
                return Ok(Some(found));
            }
        }

        Ok(None)
    }

    fn search_file(
        file: &FileMetaData,
        lookup: &[u8],
        table_cache: &TableCache,
        fill_cache: bool,
    ) -> Result<Option<(SequenceNumber, LookupResult)>> {
        let table = table_cache.get(file.number, file.file_size)?;
        let Some((key, value)) = table.get(lookup, fill_cache)? else {
            return Ok(None);
        };
        let bad_key =
            || StrataError::corruption(format!("bad internal key in table {}", file.number));
        let parsed = parse_internal_key(&key).ok_or_else(bad_key)?;
        let found = LookupResult::from_entry(&key, &value).ok_or_else(bad_key)?;
        Ok(Some((parsed.sequence, found)))
    }

    /// One cursor per level-0 file plus one concatenating cursor per
    /// non-empty deeper level
    pub fn iterators(
        &self,
        table_cache: &Arc<TableCache>,
        fill_cache: bool,
    ) -> Result<Vec<BoxedIterator>> {
        let mut iters: Vec<BoxedIterator> = Vec::new();

        for file in self.files[0].iter().rev() {
            let table = table_cache.get(file.number, file.file_size)?;
            iters.push(Box::new(table.iter(fill_cache)));
        }

        for level in 1..NUM_LEVELS {
            if !self.files[level].is_empty() {
                iters.push(Box::new(LevelIterator::new(
                    self.files[level].clone(),
                    Arc::clone(table_cache),
                    fill_cache,
                )));
            }
        }

        Ok(iters)
    }

    // =========================================================================
    // Overlap Queries
    // =========================================================================

    /// Files at `level` whose user-key range intersects `[begin, end]`
    ///
    /// At level 0 the range grows to cover every overlapping file, so the
    /// result is closed under overlap.
    pub fn overlapping_files(
        &self,
        level: usize,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Vec<Arc<FileMetaData>> {
        let mut begin = begin.map(<[u8]>::to_vec);
        let mut end = end.map(<[u8]>::to_vec);

        'restart: loop {
            let mut inputs = Vec::new();
            for file in &self.files[level] {
                if !file.overlaps(begin.as_deref(), end.as_deref()) {
                    continue;
                }
                if level == 0 {
                    if begin
                        .as_deref()
                        .is_some_and(|b| file.smallest_user_key() < b)
                    {
                        begin = Some(file.smallest_user_key().to_vec());
                        continue 'restart;
                    }
                    if end.as_deref().is_some_and(|e| file.largest_user_key() > e) {
                        end = Some(file.largest_user_key().to_vec());
                        continue 'restart;
                    }
                }
                inputs.push(Arc::clone(file));
            }
            return inputs;
        }
    }

    /// Whether any file at `level` intersects the user-key range
    pub fn overlap_in_level(&self, level: usize, smallest: &[u8], largest: &[u8]) -> bool {
        self.files[level]
            .iter()
            .any(|f| f.overlaps(Some(smallest), Some(largest)))
    }

    /// Approximate byte offset of internal key `key` across all files
    pub fn approximate_offset_of(&self, key: &[u8], table_cache: &TableCache) -> Result<u64> {
        let mut result = 0;
        for level in 0..NUM_LEVELS {
            for file in &self.files[level] {
                if compare_internal(&file.largest, key) != Ordering::Greater {
                    result += file.file_size;
                } else if compare_internal(&file.smallest, key) == Ordering::Greater {
                    if level > 0 {
                        // Sorted and disjoint: no later file can contain key
                        break;
                    }
                } else {
                    let table = table_cache.get(file.number, file.file_size)?;
                    result += table.approximate_offset_of(key)?;
                }
            }
        }
        Ok(result)
    }

    /// Per-level file numbers, for diagnostics
    pub fn file_numbers(&self) -> Vec<BTreeSet<u64>> {
        self.files
            .iter()
            .map(|files| files.iter().map(|f| f.number).collect())
            .collect()
    }
}

/// Index of the first file whose largest key is `>= key`
pub(crate) fn find_file(files: &[Arc<FileMetaData>], key: &[u8]) -> usize {
    files.partition_point(|f| compare_internal(&f.largest, key) == Ordering::Less)
}
