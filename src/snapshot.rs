//! Snapshots
//!
//! A snapshot pins a sequence number: reads through it never observe a
//! write with a higher sequence, and compaction keeps every version a live
//! snapshot can still see.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::key::SequenceNumber;

/// Open snapshots, counted per sequence number
#[derive(Debug, Default)]
pub struct SnapshotList {
    open: Mutex<BTreeMap<SequenceNumber, usize>>,
}

impl SnapshotList {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, sequence: SequenceNumber) {
        *self.open.lock().entry(sequence).or_insert(0) += 1;
        tracing::trace!(sequence, "Opened snapshot");
    }

    fn release(&self, sequence: SequenceNumber) {
        let mut open = self.open.lock();
        if let Some(count) = open.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                open.remove(&sequence);
            }
        }
        tracing::trace!(sequence, "Released snapshot");
    }

    /// Oldest sequence still pinned, if any
    pub fn oldest(&self) -> Option<SequenceNumber> {
        self.open.lock().keys().next().copied()
    }

    /// Highest sequence at or below which compaction may discard shadowed
    /// versions
    ///
    /// `last_sequence` is read under the same lock readers register under,
    /// so a reader either is already pinned here or reads at a sequence no
    /// lower than the result.
    pub fn smallest_visible(&self, last_sequence: &AtomicU64) -> SequenceNumber {
        let open = self.open.lock();
        let latest = last_sequence.load(Ordering::Acquire);
        open.keys()
            .next()
            .map_or(latest, |&oldest| oldest.min(latest))
    }

    /// Number of open snapshot handles
    pub fn len(&self) -> usize {
        self.open.lock().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.open.lock().is_empty()
    }
}

/// Handle on a pinned sequence number
///
/// Released by `Engine::release_snapshot` or when dropped, whichever comes
/// first.
pub struct Snapshot {
    sequence: SequenceNumber,
    list: Arc<SnapshotList>,
    released: AtomicBool,
}

impl Snapshot {
    pub(crate) fn new(list: &Arc<SnapshotList>, sequence: SequenceNumber) -> Self {
        list.acquire(sequence);
        Self {
            sequence,
            list: Arc::clone(list),
            released: AtomicBool::new(false),
        }
    }

    /// Pin the latest published sequence
    pub(crate) fn latest(list: &Arc<SnapshotList>, last_sequence: &AtomicU64) -> Self {
        let sequence = {
            let mut open = list.open.lock();
            let sequence = last_sequence.load(Ordering::Acquire);
            *open.entry(sequence).or_insert(0) += 1;
            sequence
        };
        tracing::trace!(sequence, "Opened snapshot");
        Self {
            sequence,
            list: Arc::clone(list),
            released: AtomicBool::new(false),
        }
    }

    /// Sequence number this snapshot reads at
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Whether this handle was taken from `list`
    pub(crate) fn belongs_to(&self, list: &Arc<SnapshotList>) -> bool {
        Arc::ptr_eq(&self.list, list)
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Unpin the sequence number; later calls do nothing
    pub(crate) fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.list.release(self.sequence);
        }
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence)
            .field("released", &self.is_released())
            .finish()
    }
}
