//! Table Reader
//!
//! Opens table files and serves point lookups and block reads. The index
//! block and the filter stay in memory; data blocks go through the shared
//! block cache.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Buf;
use parking_lot::Mutex;

use super::block::Block;
use super::cache::BlockCache;
use super::filter::BloomFilter;
use super::iterator::TableIterator;
use super::{BlockHandle, Footer, BLOCK_TRAILER_SIZE, FOOTER_SIZE};
use crate::config::CompressionType;
use crate::error::{Result, StrataError};
use crate::iterator::InternalIterator;
use crate::key::user_key;

/// Reader for one immutable table file
///
/// The file handle sits behind a mutex so that `&self` lookups can seek;
/// the lock is held only for the duration of one block read.
pub struct Table {
    number: u64,
    file: Mutex<File>,
    file_size: u64,
    index: Arc<Block>,
    filter: Option<BloomFilter>,
    cache: Option<Arc<BlockCache>>,
}

impl Table {
    /// Open a table for reading
    ///
    /// Loads the footer, the index block and the filter into memory. A
    /// damaged filter only disables filtering, unless `paranoid_checks` is
    /// set.
    pub fn open(
        path: &Path,
        number: u64,
        file_size: u64,
        cache: Option<Arc<BlockCache>>,
        paranoid_checks: bool,
    ) -> Result<Self> {
        let mut file = File::open(path)?;
        let actual_size = file.metadata()?.len();
        if actual_size < FOOTER_SIZE as u64 || (file_size != 0 && actual_size != file_size) {
            return Err(StrataError::corruption(format!(
                "table {} is {} bytes, expected {}",
                path.display(),
                actual_size,
                file_size
            )));
        }

        file.seek(SeekFrom::Start(actual_size - FOOTER_SIZE as u64))?;
        let mut footer = [0u8; FOOTER_SIZE];
        file.read_exact(&mut footer)?;
        let footer = Footer::decode(&footer)?;

        let index = Arc::new(Block::new(read_block_contents(
            &mut file,
            footer.index,
            actual_size,
        )?)?);

        let filter = if footer.filter.size == 0 {
            None
        } else {
            let loaded = read_block_contents(&mut file, footer.filter, actual_size)
                .and_then(|contents| BloomFilter::decode(&contents));
            match loaded {
                Ok(filter) => Some(filter),
                Err(e) if !paranoid_checks => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unreadable table filter"
                    );
                    None
                }
                Err(e) => return Err(e),
            }
        };

        Ok(Self {
            number,
            file: Mutex::new(file),
            file_size: actual_size,
            index,
            filter,
            cache,
        })
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Whether the filter admits `user_key`; always true without a filter
    pub fn may_contain(&self, user_key: &[u8]) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.may_contain(user_key))
    }

    /// First entry at or after the lookup key `lookup` that belongs to the
    /// same user key
    ///
    /// Returns the encoded internal key and value; the caller decides what
    /// the entry's kind means.
    pub fn get(&self, lookup: &[u8], fill_cache: bool) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let target_user_key = user_key(lookup);
        if !self.may_contain(target_user_key) {
            return Ok(None);
        }

        let mut index_iter = self.index.iter();
        index_iter.seek(lookup)?;
        if !index_iter.valid() {
            return Ok(None);
        }

        let handle = BlockHandle::decode(index_iter.value())?;
        let block = self.read_block(handle, fill_cache)?;
        let mut iter = block.iter();
        iter.seek(lookup)?;

        if iter.valid() && user_key(iter.key()) == target_user_key {
            return Ok(Some((iter.key().to_vec(), iter.value().to_vec())));
        }
        Ok(None)
    }

    /// Approximate file offset at which `key` would be stored
    pub fn approximate_offset_of(&self, key: &[u8]) -> Result<u64> {
        let mut index_iter = self.index.iter();
        index_iter.seek(key)?;
        if index_iter.valid() {
            Ok(BlockHandle::decode(index_iter.value())?.offset)
        } else {
            // Past the last key: the meta blocks start right after the data
            index_iter.seek_to_last()?;
            if !index_iter.valid() {
                return Ok(0);
            }
            let last = BlockHandle::decode(index_iter.value())?;
            Ok(last.offset + last.size + BLOCK_TRAILER_SIZE as u64)
        }
    }

    /// Create a two-level iterator over every entry
    pub fn iter(self: &Arc<Self>, fill_cache: bool) -> TableIterator {
        TableIterator::new(Arc::clone(self), fill_cache)
    }

    pub(super) fn index(&self) -> &Arc<Block> {
        &self.index
    }

    /// Read a data block, consulting the block cache first
    pub(super) fn read_block(&self, handle: BlockHandle, fill_cache: bool) -> Result<Arc<Block>> {
        if let Some(cache) = &self.cache {
            if let Some(block) = cache.get(self.number, handle.offset) {
                return Ok(block);
            }
        }

        let contents = {
            let mut file = self.file.lock();
            read_block_contents(&mut file, handle, self.file_size)?
        };
        let block = Arc::new(Block::new(contents)?);

        if fill_cache {
            if let Some(cache) = &self.cache {
                cache.insert(self.number, handle.offset, Arc::clone(&block));
            }
        }
        Ok(block)
    }
}

/// Read, verify and decompress the block at `handle`
fn read_block_contents(file: &mut File, handle: BlockHandle, file_size: u64) -> Result<Vec<u8>> {
    let total = handle.size + BLOCK_TRAILER_SIZE as u64;
    if handle.offset.saturating_add(total) > file_size {
        return Err(StrataError::corruption(format!(
            "block handle {:?} points past the end of a {} byte table",
            handle, file_size
        )));
    }

    file.seek(SeekFrom::Start(handle.offset))?;
    let mut buf = vec![0u8; total as usize];
    file.read_exact(&mut buf)?;

    let (contents, mut trailer) = buf.split_at(handle.size as usize);
    let tag = trailer.get_u8();
    let expected_crc = trailer.get_u32_le();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(contents);
    hasher.update(&[tag]);
    if hasher.finalize() != expected_crc {
        return Err(StrataError::corruption(format!(
            "block checksum mismatch at offset {}",
            handle.offset
        )));
    }

    match CompressionType::from_tag(tag) {
        Some(CompressionType::None) => Ok(contents.to_vec()),
        Some(CompressionType::Lz4) => Ok(lz4_flex::block::decompress_size_prepended(contents)?),
        None => Err(StrataError::corruption(format!(
            "unknown block compression tag {}",
            tag
        ))),
    }
}
