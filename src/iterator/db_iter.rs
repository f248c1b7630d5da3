//! User-facing iterator
//!
//! Turns the merged stream of internal entries into user keys and values:
//! entries newer than the iterator's sequence are hidden, only the newest
//! version of each key is yielded, and tombstoned keys are skipped. Bounds
//! and the entry limit are enforced here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{InternalIterator, MergingIterator};
use crate::config::IteratorOptions;
use crate::error::{Result, StrataError};
use crate::key::{
    encode_internal_key, lookup_key, parse_internal_key, SequenceNumber, ValueKind,
    MAX_SEQUENCE_NUMBER,
};
use crate::snapshot::Snapshot;
use crate::version::Version;

/// One side of a key range
#[derive(Debug, Clone)]
struct Bound {
    key: Vec<u8>,
    inclusive: bool,
}

impl Bound {
    fn from_options(inclusive: &Option<Vec<u8>>, exclusive: &Option<Vec<u8>>) -> Option<Self> {
        // The inclusive form takes precedence when both are given
        if let Some(key) = inclusive {
            return Some(Self {
                key: key.clone(),
                inclusive: true,
            });
        }
        exclusive.as_ref().map(|key| Self {
            key: key.clone(),
            inclusive: false,
        })
    }
}

/// Ordered cursor over the live keys of one sequence-number snapshot
///
/// Yields `(key, value)` pairs through `std::iter::Iterator` or in bounded
/// chunks through `next_batch`. Dropping or closing the iterator releases
/// the versions, memtables and snapshot it pinned.
pub struct DbIterator {
    /// `None` once closed
    merge: Option<MergingIterator>,
    _snapshot: Option<Snapshot>,
    /// Keeps the table files behind the merge from being deleted
    version: Option<Arc<Version>>,
    /// Run when this iterator drops the last handle on a replaced version
    on_stale_version: Option<Box<dyn FnOnce() + Send>>,
    sequence: SequenceNumber,
    engine_open: Arc<AtomicBool>,

    reverse: bool,
    lower: Option<Bound>,
    upper: Option<Bound>,
    limit: Option<usize>,
    high_water_mark_bytes: usize,

    /// Whether the merge has been positioned at all
    positioned: bool,
    /// Whether the entry in `saved_key`/`saved_value` was handed out
    consumed: bool,
    valid: bool,
    yielded: usize,
    saved_key: Vec<u8>,
    saved_value: Vec<u8>,
}

impl DbIterator {
    pub(crate) fn new(
        merge: MergingIterator,
        version: Arc<Version>,
        snapshot: Snapshot,
        options: &IteratorOptions<'_>,
        engine_open: Arc<AtomicBool>,
    ) -> Self {
        Self {
            merge: Some(merge),
            sequence: snapshot.sequence(),
            _snapshot: Some(snapshot),
            version: Some(version),
            on_stale_version: None,
            engine_open,
            reverse: options.reverse,
            lower: Bound::from_options(&options.gte, &options.gt),
            upper: Bound::from_options(&options.lte, &options.lt),
            limit: options.limit,
            high_water_mark_bytes: options.high_water_mark_bytes,
            positioned: false,
            consumed: false,
            valid: false,
            yielded: 0,
            saved_key: Vec::new(),
            saved_value: Vec::new(),
        }
    }

    /// Call `hook` if releasing this iterator frees a version that is no
    /// longer current
    pub(crate) fn on_stale_version(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_stale_version = Some(Box::new(hook));
        self
    }

    /// Sequence number the iterator reads at
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn is_closed(&self) -> bool {
        self.merge.is_none()
    }

    /// Release everything the iterator holds; later calls fail with `NotOpen`
    pub fn close(&mut self) {
        self.merge = None;
        self._snapshot = None;
        self.release_version();
        self.valid = false;
    }

    /// Reposition at `target`
    ///
    /// Forward iterators land on the first key `>= target`, reverse ones on
    /// the last key `<= target`. A target outside the bounds exhausts the
    /// iterator.
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.check_open()?;
        self.positioned = true;
        self.consumed = false;

        if !self.in_range(target) {
            self.valid = false;
            return Ok(());
        }

        let result = if self.reverse {
            let key = encode_internal_key(target, 0, ValueKind::Deletion);
            self.merge_mut()?
                .seek_for_prev(&key)
                .and_then(|_| self.find_prev_user_entry())
        } else {
            let key = lookup_key(target, self.sequence);
            self.merge_mut()?
                .seek(&key)
                .and_then(|_| self.find_next_user_entry(None))
        };
        self.settle(result)
    }

    /// Next entry, or `None` once the range, the limit or the data is
    /// exhausted
    pub fn next_entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.check_open()?;

        if !self.positioned {
            self.positioned = true;
            let result = self.seek_to_start();
            self.settle(result)?;
        } else if self.consumed && self.valid {
            let result = self.advance();
            self.settle(result)?;
        }

        if !self.valid || self.limit.is_some_and(|limit| self.yielded >= limit) {
            self.valid = false;
            return Ok(None);
        }

        self.consumed = true;
        self.yielded += 1;
        Ok(Some((self.saved_key.clone(), self.saved_value.clone())))
    }

    /// Up to `max` entries, stopping early once `high_water_mark_bytes` of
    /// keys and values were gathered
    ///
    /// At least one entry is returned while any remain; an empty batch means
    /// the iterator is exhausted.
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut batch = Vec::new();
        let mut bytes = 0;

        while batch.len() < max.max(1) {
            let Some((key, value)) = self.next_entry()? else {
                break;
            };
            bytes += key.len() + value.len();
            batch.push((key, value));
            if bytes >= self.high_water_mark_bytes {
                break;
            }
        }
        Ok(batch)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn release_version(&mut self) {
        let Some(version) = self.version.take() else {
            return;
        };
        // The current version is also held by the version set, so a sole
        // handle means the version was replaced
        let stale = Arc::strong_count(&version) == 1;
        drop(version);
        if stale {
            if let Some(hook) = self.on_stale_version.take() {
                hook();
            }
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.merge.is_none() || !self.engine_open.load(Ordering::Acquire) {
            return Err(StrataError::NotOpen);
        }
        Ok(())
    }

    fn merge_mut(&mut self) -> Result<&mut MergingIterator> {
        self.merge.as_mut().ok_or(StrataError::NotOpen)
    }

    /// Apply bounds to a freshly found entry; errors leave the iterator
    /// exhausted
    fn settle(&mut self, result: Result<()>) -> Result<()> {
        if let Err(e) = result {
            self.valid = false;
            return Err(e);
        }
        if self.valid && !self.in_range(&self.saved_key) {
            self.valid = false;
        }
        Ok(())
    }

    fn seek_to_start(&mut self) -> Result<()> {
        let sequence = self.sequence;
        if self.reverse {
            match self.upper.clone() {
                // Last entry of the bound key itself
                Some(Bound {
                    key,
                    inclusive: true,
                }) => self
                    .merge_mut()?
                    .seek_for_prev(&encode_internal_key(&key, 0, ValueKind::Deletion))?,
                // Last entry of any key before the bound
                Some(Bound {
                    key,
                    inclusive: false,
                }) => self.merge_mut()?.seek_for_prev(&encode_internal_key(
                    &key,
                    MAX_SEQUENCE_NUMBER,
                    ValueKind::Value,
                ))?,
                None => self.merge_mut()?.seek_to_last()?,
            }
            self.find_prev_user_entry()
        } else {
            match self.lower.clone() {
                Some(bound) => {
                    self.merge_mut()?.seek(&lookup_key(&bound.key, sequence))?;
                    let skip = (!bound.inclusive).then_some(bound.key);
                    self.find_next_user_entry(skip)
                }
                None => {
                    self.merge_mut()?.seek_to_first()?;
                    self.find_next_user_entry(None)
                }
            }
        }
    }

    fn advance(&mut self) -> Result<()> {
        if self.reverse {
            // The merge already sits before the saved entry
            self.find_prev_user_entry()
        } else {
            let skip = std::mem::take(&mut self.saved_key);
            self.merge_mut()?.next()?;
            self.find_next_user_entry(Some(skip))
        }
    }

    /// Forward: settle on the newest visible value of the next user key,
    /// hiding `skip` and every key shadowed by a tombstone
    fn find_next_user_entry(&mut self, mut skip: Option<Vec<u8>>) -> Result<()> {
        let sequence = self.sequence;
        let merge = self.merge.as_mut().ok_or(StrataError::NotOpen)?;

        while merge.valid() {
            let parsed = parse_internal_key(merge.key())
                .ok_or_else(|| StrataError::corruption("bad internal key during iteration"))?;

            if parsed.sequence <= sequence {
                let hidden = skip.as_deref().is_some_and(|s| parsed.user_key <= s);
                match parsed.kind {
                    ValueKind::Deletion => {
                        skip = Some(parsed.user_key.to_vec());
                    }
                    ValueKind::Value if !hidden => {
                        self.saved_key.clear();
                        self.saved_key.extend_from_slice(parsed.user_key);
                        self.saved_value.clear();
                        self.saved_value.extend_from_slice(merge.value());
                        self.valid = true;
                        return Ok(());
                    }
                    ValueKind::Value => {}
                }
            }
            merge.next()?;
        }

        self.valid = false;
        Ok(())
    }

    /// Reverse: walk back over every version of the previous user key and
    /// keep the newest visible one, leaving the merge before it
    fn find_prev_user_entry(&mut self) -> Result<()> {
        let sequence = self.sequence;
        let merge = self.merge.as_mut().ok_or(StrataError::NotOpen)?;

        let mut kind = ValueKind::Deletion;
        self.saved_key.clear();
        self.saved_value.clear();

        while merge.valid() {
            let parsed = parse_internal_key(merge.key())
                .ok_or_else(|| StrataError::corruption("bad internal key during iteration"))?;

            if parsed.sequence <= sequence {
                if kind != ValueKind::Deletion && parsed.user_key < self.saved_key.as_slice() {
                    // Reached an older user key: the saved entry is complete
                    break;
                }
                kind = parsed.kind;
                match kind {
                    ValueKind::Deletion => {
                        self.saved_key.clear();
                        self.saved_value.clear();
                    }
                    ValueKind::Value => {
                        self.saved_key.clear();
                        self.saved_key.extend_from_slice(parsed.user_key);
                        self.saved_value.clear();
                        self.saved_value.extend_from_slice(merge.value());
                    }
                }
            }
            merge.prev()?;
        }

        self.valid = kind == ValueKind::Value;
        Ok(())
    }

    fn in_range(&self, key: &[u8]) -> bool {
        let above_lower = self.lower.as_ref().map_or(true, |b| {
            if b.inclusive {
                key >= b.key.as_slice()
            } else {
                key > b.key.as_slice()
            }
        });
        let below_upper = self.upper.as_ref().map_or(true, |b| {
            if b.inclusive {
                key <= b.key.as_slice()
            } else {
                key < b.key.as_slice()
            }
        });
        above_lower && below_upper
    }
}

impl Drop for DbIterator {
    fn drop(&mut self) {
        self.release_version();
    }
}

impl Iterator for DbIterator {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.merge.is_none() {
            return None;
        }
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(e) => {
                // Surface the error once, then stop
                self.close();
                Some(Err(e))
            }
        }
    }
}
