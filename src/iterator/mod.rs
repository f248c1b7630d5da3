//! Iterator Module
//!
//! Ordered cursors over internal entries and the user-facing iterator built
//! on top of them.
//!
//! ## Layers
//! ```text
//!   DbIterator        snapshot filter, tombstones, bounds, limit, batches
//!        │
//!   MergingIterator   k-way merge, one direction
//!        │
//!   ┌────┴──────────────┬────────────────┐
//!   MemTableIterator   TableIterator    LevelIterator (L1+)
//! ```

mod db_iter;
mod merge;

pub use db_iter::DbIterator;
pub use merge::MergingIterator;

use crate::error::Result;

/// Bidirectional cursor over encoded internal keys in internal-key order
///
/// Positioning methods leave the cursor invalid when no entry qualifies.
/// `key` and `value` may only be called while `valid()` is true.
pub trait InternalIterator: Send {
    fn valid(&self) -> bool;

    fn seek_to_first(&mut self) -> Result<()>;

    fn seek_to_last(&mut self) -> Result<()>;

    /// Position at the first entry with key `>= target`
    fn seek(&mut self, target: &[u8]) -> Result<()>;

    /// Position at the last entry with key `<= target`
    fn seek_for_prev(&mut self, target: &[u8]) -> Result<()>;

    fn next(&mut self) -> Result<()>;

    fn prev(&mut self) -> Result<()>;

    fn key(&self) -> &[u8];

    fn value(&self) -> &[u8];
}

pub type BoxedIterator = Box<dyn InternalIterator>;

/// Cursor over an in-memory sorted vector of entries
///
/// Used for decoded blocks and in tests.
pub struct VecIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: Option<usize>,
}

impl VecIterator {
    /// `entries` must already be sorted by internal key
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            entries,
            position: None,
        }
    }

    fn lower_bound(&self, target: &[u8]) -> usize {
        self.entries.partition_point(|(key, _)| {
            crate::key::compare_internal(key, target) == std::cmp::Ordering::Less
        })
    }
}

impl InternalIterator for VecIterator {
    fn valid(&self) -> bool {
        self.position.is_some()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.position = if self.entries.is_empty() { None } else { Some(0) };
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.position = self.entries.len().checked_sub(1);
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        let idx = self.lower_bound(target);
        self.position = (idx < self.entries.len()).then_some(idx);
        Ok(())
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<()> {
        let idx = self.entries.partition_point(|(key, _)| {
            crate::key::compare_internal(key, target) != std::cmp::Ordering::Greater
        });
        self.position = idx.checked_sub(1);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.position = match self.position {
            Some(i) if i + 1 < self.entries.len() => Some(i + 1),
            _ => None,
        };
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        self.position = self.position.and_then(|i| i.checked_sub(1));
        Ok(())
    }

    fn key(&self) -> &[u8] {
        match self.position {
            Some(i) => &self.entries[i].0,
            None => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match self.position {
            Some(i) => &self.entries[i].1,
            None => &[],
        }
    }
}
