//! Block and table caches
//!
//! Both are `quick_cache` instances shared by every reader of the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_cache::sync::Cache;

use super::{Block, Table};
use crate::error::Result;
use crate::filename::table_file_name;

/// (table number, block offset)
type BlockKey = (u64, u64);

/// Uncompressed blocks, cached in-memory after being read from disk
pub struct BlockCache {
    data: Cache<BlockKey, Arc<Block>>,
    block_size: usize,
    capacity_bytes: usize,
}

impl BlockCache {
    /// Cache roughly `capacity_bytes` worth of `block_size` blocks
    pub fn new(capacity_bytes: usize, block_size: usize) -> Self {
        let block_size = block_size.max(1);
        let blocks = (capacity_bytes / block_size).max(16);
        Self {
            data: Cache::new(blocks),
            block_size,
            capacity_bytes,
        }
    }

    pub fn get(&self, table: u64, offset: u64) -> Option<Arc<Block>> {
        self.data.get(&(table, offset))
    }

    pub fn insert(&self, table: u64, offset: u64, block: Arc<Block>) {
        if self.capacity_bytes > 0 {
            self.data.insert((table, offset), block);
        }
    }

    /// Number of cached blocks
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes held by cached blocks
    pub fn approximate_usage(&self) -> usize {
        self.len() * self.block_size
    }
}

/// Open table readers, keyed by file number
///
/// Evicting a table only drops the cache's handle: iterators holding the
/// same `Arc<Table>` keep the file open until they finish.
pub struct TableCache {
    dir: PathBuf,
    tables: Cache<u64, Arc<Table>>,
    block_cache: Arc<BlockCache>,
    paranoid_checks: bool,
}

impl TableCache {
    pub fn new(
        dir: &Path,
        max_open_files: usize,
        block_cache: Arc<BlockCache>,
        paranoid_checks: bool,
    ) -> Self {
        Self {
            dir: dir.to_path_buf(),
            tables: Cache::new(max_open_files.max(1)),
            block_cache,
            paranoid_checks,
        }
    }

    /// Fetch an open table, opening the file on a miss
    pub fn get(&self, number: u64, file_size: u64) -> Result<Arc<Table>> {
        if let Some(table) = self.tables.get(&number) {
            return Ok(table);
        }

        let path = self.dir.join(table_file_name(number));
        let table = Arc::new(Table::open(
            &path,
            number,
            file_size,
            Some(Arc::clone(&self.block_cache)),
            self.paranoid_checks,
        )?);
        self.tables.insert(number, Arc::clone(&table));
        Ok(table)
    }

    /// Forget a table whose file is being deleted
    pub fn evict(&self, number: u64) {
        self.tables.remove(&number);
    }

    pub fn block_cache(&self) -> &Arc<BlockCache> {
        &self.block_cache
    }
}
