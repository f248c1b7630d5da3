//! Table Iterator
//!
//! Two-level cursor: the index block picks a data block, the data block
//! iterator walks its entries. Empty positions at block boundaries are
//! skipped in the direction of travel.

use std::sync::Arc;

use super::block::BlockIterator;
use super::reader::Table;
use super::BlockHandle;
use crate::error::Result;
use crate::iterator::InternalIterator;

pub struct TableIterator {
    table: Arc<Table>,
    fill_cache: bool,
    index_iter: BlockIterator,
    data_iter: Option<BlockIterator>,
    /// Handle of the block behind `data_iter`
    data_handle: Option<BlockHandle>,
}

impl TableIterator {
    pub(super) fn new(table: Arc<Table>, fill_cache: bool) -> Self {
        let index_iter = table.index().iter();
        Self {
            table,
            fill_cache,
            index_iter,
            data_iter: None,
            data_handle: None,
        }
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Point `data_iter` at the block named by the index cursor
    fn init_data_block(&mut self) -> Result<()> {
        if !self.index_iter.valid() {
            self.data_iter = None;
            self.data_handle = None;
            return Ok(());
        }

        let handle = BlockHandle::decode(self.index_iter.value())?;
        if self.data_iter.is_some() && self.data_handle == Some(handle) {
            return Ok(());
        }

        let block = self.table.read_block(handle, self.fill_cache)?;
        self.data_iter = Some(block.iter());
        self.data_handle = Some(handle);
        Ok(())
    }

    fn data_valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|iter| iter.valid())
    }

    fn skip_empty_blocks_forward(&mut self) -> Result<()> {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return Ok(());
            }
            self.index_iter.next()?;
            self.init_data_block()?;
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_first()?;
            }
        }
        Ok(())
    }

    fn skip_empty_blocks_backward(&mut self) -> Result<()> {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.data_iter = None;
                return Ok(());
            }
            self.index_iter.prev()?;
            self.init_data_block()?;
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_last()?;
            }
        }
        Ok(())
    }
}

impl InternalIterator for TableIterator {
    fn valid(&self) -> bool {
        self.data_valid()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.index_iter.seek_to_first()?;
        self.init_data_block()?;
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_first()?;
        }
        self.skip_empty_blocks_forward()
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.index_iter.seek_to_last()?;
        self.init_data_block()?;
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_last()?;
        }
        self.skip_empty_blocks_backward()
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.index_iter.seek(target)?;
        self.init_data_block()?;
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek(target)?;
        }
        self.skip_empty_blocks_forward()
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<()> {
        self.seek(target)?;
        if !self.valid() {
            return self.seek_to_last();
        }
        if crate::key::compare_internal(self.key(), target) == std::cmp::Ordering::Greater {
            self.prev()?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        if let Some(iter) = self.data_iter.as_mut() {
            iter.next()?;
        }
        self.skip_empty_blocks_forward()
    }

    fn prev(&mut self) -> Result<()> {
        if let Some(iter) = self.data_iter.as_mut() {
            iter.prev()?;
        }
        self.skip_empty_blocks_backward()
    }

    fn key(&self) -> &[u8] {
        self.data_iter.as_ref().map(|iter| iter.key()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.data_iter.as_ref().map(|iter| iter.value()).unwrap_or(&[])
    }
}
