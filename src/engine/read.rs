//! Read path

use std::sync::Arc;

use super::{EngineInner, SuperVersion};
use crate::compaction::Task;
use crate::config::{IteratorOptions, ReadOptions};
use crate::error::{Result, StrataError};
use crate::iterator::{BoxedIterator, DbIterator, MergingIterator};
use crate::key::{lookup_key, LookupResult, SequenceNumber, MAX_SEQUENCE_NUMBER};
use crate::memtable::MemTableIterator;
use crate::snapshot::Snapshot;

impl EngineInner {
    /// Get a value by key
    ///
    /// Search order:
    /// 1. Active memtable
    /// 2. Immutable memtables, newest first
    /// 3. Table files, level by level
    pub(super) fn get(&self, key: &[u8], options: &ReadOptions<'_>) -> Result<Option<Vec<u8>>> {
        let (sv, pin) = self.read_view(options.snapshot)?;
        self.get_at(&sv, key, pin.sequence(), options.fill_cache)
    }

    pub(super) fn get_many<K: AsRef<[u8]>>(
        &self,
        keys: &[K],
        options: &ReadOptions<'_>,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        let (sv, pin) = self.read_view(options.snapshot)?;
        keys.iter()
            .map(|key| self.get_at(&sv, key.as_ref(), pin.sequence(), options.fill_cache))
            .collect()
    }

    /// Cursor over the keys selected by `options`
    ///
    /// Pins a snapshot (the caller's, or one at the latest sequence), the
    /// memtables and the version for the iterator's lifetime.
    pub(super) fn iter(&self, options: &IteratorOptions<'_>) -> Result<DbIterator> {
        let (sv, snapshot) = self.read_view(options.snapshot)?;

        let mut children: Vec<BoxedIterator> = Vec::with_capacity(sv.imms.len() + 8);
        children.push(Box::new(MemTableIterator::new(Arc::clone(&sv.mem))));
        for imm in sv.imms.iter().rev() {
            children.push(Box::new(MemTableIterator::new(Arc::clone(&imm.table))));
        }
        children.extend(
            sv.version
                .iterators(&self.table_cache, options.fill_cache)?,
        );

        let iter = DbIterator::new(
            MergingIterator::new(children),
            Arc::clone(&sv.version),
            snapshot,
            options,
            Arc::clone(&self.open),
        );
        Ok(match self.worker.lock().as_ref() {
            Some(worker) => {
                let scheduler = worker.scheduler();
                iter.on_stale_version(move || {
                    let _ = scheduler.send(Task::CollectGarbage);
                })
            }
            None => iter,
        })
    }

    pub(super) fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64> {
        self.check_open()?;
        let version = self.current_super_version().version.clone();
        let start = version.approximate_offset_of(
            &lookup_key(start, MAX_SEQUENCE_NUMBER),
            &self.table_cache,
        )?;
        let end =
            version.approximate_offset_of(&lookup_key(end, MAX_SEQUENCE_NUMBER), &self.table_cache)?;
        Ok(end.saturating_sub(start))
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Pin the sequence to read at, then take the super version to read from
    ///
    /// The pin keeps compaction from discarding any version visible at that
    /// sequence for as long as the read holds it. The sequence is taken
    /// first: every write at or below it is already in a memtable or table
    /// the super version covers.
    fn read_view(&self, snapshot: Option<&Snapshot>) -> Result<(Arc<SuperVersion>, Snapshot)> {
        self.check_open()?;
        let pin = match snapshot {
            Some(snapshot) => {
                if !snapshot.belongs_to(&self.snapshots) || snapshot.is_released() {
                    return Err(StrataError::InvalidArgument(
                        "snapshot is released or belongs to another database".to_string(),
                    ));
                }
                Snapshot::new(&self.snapshots, snapshot.sequence())
            }
            None => Snapshot::latest(&self.snapshots, &self.last_sequence),
        };
        Ok((self.current_super_version(), pin))
    }

    fn get_at(
        &self,
        sv: &SuperVersion,
        key: &[u8],
        sequence: SequenceNumber,
        fill_cache: bool,
    ) -> Result<Option<Vec<u8>>> {
        if let Some(found) = sv.mem.get(key, sequence) {
            return Ok(found.into_value());
        }
        for imm in sv.imms.iter().rev() {
            if let Some(found) = imm.table.get(key, sequence) {
                return Ok(found.into_value());
            }
        }

        let lookup = lookup_key(key, sequence);
        Ok(sv
            .version
            .get(&lookup, &self.table_cache, fill_cache)?
            .and_then(LookupResult::into_value))
    }
}
