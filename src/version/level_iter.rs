//! Concatenating cursor over the disjoint, sorted files of one level

use std::cmp::Ordering;
use std::sync::Arc;

use super::levels::find_file;
use super::FileMetaData;
use crate::error::Result;
use crate::iterator::InternalIterator;
use crate::key::compare_internal;
use crate::table::{TableCache, TableIterator};

/// Opens one table at a time, in file order
pub struct LevelIterator {
    files: Vec<Arc<FileMetaData>>,
    table_cache: Arc<TableCache>,
    fill_cache: bool,
    index: usize,
    current: Option<TableIterator>,
}

impl LevelIterator {
    pub fn new(
        files: Vec<Arc<FileMetaData>>,
        table_cache: Arc<TableCache>,
        fill_cache: bool,
    ) -> Self {
        Self {
            files,
            table_cache,
            fill_cache,
            index: 0,
            current: None,
        }
    }

    fn open(&mut self, index: usize) -> Result<()> {
        if index >= self.files.len() {
            self.current = None;
            self.index = self.files.len();
            return Ok(());
        }
        let file = &self.files[index];
        let table = self.table_cache.get(file.number, file.file_size)?;
        self.current = Some(table.iter(self.fill_cache));
        self.index = index;
        Ok(())
    }

    fn current_valid(&self) -> bool {
        self.current.as_ref().is_some_and(|iter| iter.valid())
    }

    fn skip_forward(&mut self) -> Result<()> {
        while self.current.is_some() && !self.current_valid() {
            self.open(self.index + 1)?;
            if let Some(iter) = self.current.as_mut() {
                iter.seek_to_first()?;
            }
        }
        Ok(())
    }

    fn skip_backward(&mut self) -> Result<()> {
        while self.current.is_some() && !self.current_valid() {
            if self.index == 0 {
                self.current = None;
                return Ok(());
            }
            self.open(self.index - 1)?;
            if let Some(iter) = self.current.as_mut() {
                iter.seek_to_last()?;
            }
        }
        Ok(())
    }
}

impl InternalIterator for LevelIterator {
    fn valid(&self) -> bool {
        self.current_valid()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.open(0)?;
        if let Some(iter) = self.current.as_mut() {
            iter.seek_to_first()?;
        }
        self.skip_forward()
    }

    fn seek_to_last(&mut self) -> Result<()> {
        match self.files.len().checked_sub(1) {
            Some(last) => self.open(last)?,
            None => self.current = None,
        }
        if let Some(iter) = self.current.as_mut() {
            iter.seek_to_last()?;
        }
        self.skip_backward()
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        let index = find_file(&self.files, target);
        self.open(index)?;
        if let Some(iter) = self.current.as_mut() {
            iter.seek(target)?;
        }
        self.skip_forward()
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<()> {
        self.seek(target)?;
        if !self.valid() {
            return self.seek_to_last();
        }
        if compare_internal(self.key(), target) == Ordering::Greater {
            self.prev()?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        if let Some(iter) = self.current.as_mut() {
            iter.next()?;
        }
        self.skip_forward()
    }

    fn prev(&mut self) -> Result<()> {
        if let Some(iter) = self.current.as_mut() {
            iter.prev()?;
        }
        self.skip_backward()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map(|iter| iter.key()).unwrap_or(&[])
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map(|iter| iter.value()).unwrap_or(&[])
    }
}
