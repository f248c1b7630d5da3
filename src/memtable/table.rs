//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::key::{lookup_key, InternalKey, LookupResult, SequenceNumber, ValueKind};
use crate::wal::{Operation, WalEntry};

/// Per-entry bookkeeping overhead counted towards the memtable size
const ENTRY_OVERHEAD: usize = 32;

/// In-memory table for recent writes
pub struct MemTable {
    /// Internal key → value (empty for tombstones)
    data: RwLock<BTreeMap<InternalKey, Vec<u8>>>,

    /// Approximate size in bytes
    size: AtomicUsize,

    entry_count: AtomicUsize,

    /// Highest sequence number inserted so far
    max_sequence: AtomicU64,
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            size: AtomicUsize::new(0),
            entry_count: AtomicUsize::new(0),
            max_sequence: AtomicU64::new(0),
        }
    }

    /// Insert one versioned entry, returning the new approximate size
    pub fn add(
        &self,
        sequence: SequenceNumber,
        kind: ValueKind,
        key: &[u8],
        value: &[u8],
    ) -> usize {
        let internal = InternalKey::new(key, sequence, kind);
        let added = internal.encoded().len() + value.len() + ENTRY_OVERHEAD;

        self.data.write().insert(internal, value.to_vec());
        self.entry_count.fetch_add(1, Ordering::Relaxed);
        self.max_sequence.fetch_max(sequence, Ordering::Release);
        self.size.fetch_add(added, Ordering::Relaxed) + added
    }

    /// Apply every operation of a logged batch, in order
    pub fn apply(&self, entry: &WalEntry) -> usize {
        let mut size = self.size();
        for (offset, op) in entry.operations.iter().enumerate() {
            let sequence = entry.sequence + offset as u64;
            size = match op {
                Operation::Put { key, value } => self.add(sequence, ValueKind::Value, key, value),
                Operation::Delete { key } => self.add(sequence, ValueKind::Deletion, key, &[]),
            };
        }
        size
    }

    /// Newest version of `key` visible at `snapshot`
    ///
    /// Returns `None` when the memtable holds no version of the key at or
    /// below the snapshot, so older sources must be consulted.
    pub fn get(&self, key: &[u8], snapshot: SequenceNumber) -> Option<LookupResult> {
        let lookup = InternalKey::from_encoded(lookup_key(key, snapshot));
        let data = self.data.read();

        let (found, value) = data
            .range((Bound::Included(lookup), Bound::Unbounded))
            .next()?;
        let parsed = found.parsed()?;

        if parsed.user_key != key {
            return None;
        }

        Some(match parsed.kind {
            ValueKind::Value => LookupResult::Value(value.clone()),
            ValueKind::Deletion => LookupResult::Tombstone,
        })
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Get entry count (every version counts)
    pub fn entry_count(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    pub fn max_sequence(&self) -> SequenceNumber {
        self.max_sequence.load(Ordering::Acquire)
    }

    /// First entry strictly after/before or at/around `key`, used by the
    /// memtable cursor
    pub(super) fn entry_at(
        &self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        from_back: bool,
    ) -> Option<(Vec<u8>, Vec<u8>)> {
        let to_owned = |bound: Bound<&[u8]>| match bound {
            Bound::Included(k) => Bound::Included(InternalKey::from_encoded(k.to_vec())),
            Bound::Excluded(k) => Bound::Excluded(InternalKey::from_encoded(k.to_vec())),
            Bound::Unbounded => Bound::Unbounded,
        };

        let data = self.data.read();
        let mut range = data.range((to_owned(lower), to_owned(upper)));
        let found = if from_back {
            range.next_back()
        } else {
            range.next()
        };
        found.map(|(k, v)| (k.encoded().to_vec(), v.clone()))
    }
}
