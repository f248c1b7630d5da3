//! MemTable cursor
//!
//! Re-seeks the shared tree on every step so that no lock is held between
//! calls. Entries inserted behind the cursor carry newer sequence numbers
//! and are filtered out by the snapshot-aware layers above.

use std::ops::Bound;
use std::sync::Arc;

use super::MemTable;
use crate::error::Result;
use crate::iterator::InternalIterator;

pub struct MemTableIterator {
    table: Arc<MemTable>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl MemTableIterator {
    pub fn new(table: Arc<MemTable>) -> Self {
        Self {
            table,
            current: None,
        }
    }
}

impl InternalIterator for MemTableIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.current = self
            .table
            .entry_at(Bound::Unbounded, Bound::Unbounded, false);
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.current = self.table.entry_at(Bound::Unbounded, Bound::Unbounded, true);
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.current = self
            .table
            .entry_at(Bound::Included(target), Bound::Unbounded, false);
        Ok(())
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<()> {
        self.current = self
            .table
            .entry_at(Bound::Unbounded, Bound::Included(target), true);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        if let Some((key, _)) = self.current.take() {
            self.current = self
                .table
                .entry_at(Bound::Excluded(&key), Bound::Unbounded, false);
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        if let Some((key, _)) = self.current.take() {
            self.current = self
                .table
                .entry_at(Bound::Unbounded, Bound::Excluded(&key), true);
        }
        Ok(())
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|(k, _)| k.as_slice()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|(_, v)| v.as_slice()).unwrap_or(&[])
    }
}
