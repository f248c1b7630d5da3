//! Table Builder
//!
//! Writes sorted internal entries to a new table file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::BufMut;

use super::block::BlockBuilder;
use super::filter::FilterBuilder;
use super::{BlockHandle, Footer};
use crate::config::{CompressionType, Config};
use crate::error::Result;
use crate::key::user_key;

/// What a finished table holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub file_size: u64,
    pub entry_count: u64,
    /// Smallest internal key
    pub smallest: Vec<u8>,
    /// Largest internal key
    pub largest: Vec<u8>,
}

/// Builder for creating new tables from sorted internal entries
pub struct TableBuilder {
    path: PathBuf,
    writer: BufWriter<File>,

    block_size: usize,
    compression: CompressionType,
    bloom_bits_per_key: usize,

    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter: FilterBuilder,

    /// Bytes written so far
    offset: u64,
    entry_count: u64,
    smallest: Option<Vec<u8>>,
    largest: Vec<u8>,
}

impl TableBuilder {
    /// Create a new table builder
    ///
    /// Call `add()` in increasing internal-key order, then `finish()` to
    /// write the filter, index and footer.
    pub fn new(path: &Path, config: &Config) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            block_size: config.block_size,
            compression: config.compression,
            bloom_bits_per_key: config.bloom_bits_per_key,
            data_block: BlockBuilder::new(config.block_restart_interval),
            index_block: BlockBuilder::new(1),
            filter: FilterBuilder::new(),
            offset: 0,
            entry_count: 0,
            smallest: None,
            largest: Vec::new(),
        })
    }

    /// Add an entry (must be called in sorted internal-key order)
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.smallest.is_none() {
            self.smallest = Some(key.to_vec());
        }
        self.largest.clear();
        self.largest.extend_from_slice(key);

        if self.bloom_bits_per_key > 0 {
            self.filter.add_key(user_key(key));
        }
        self.data_block.add(key, value);
        self.entry_count += 1;

        if self.data_block.current_size_estimate() >= self.block_size {
            self.flush_data_block()?;
        }
        Ok(())
    }

    /// Bytes the file would have if finished now (excluding filter/index)
    pub fn file_size(&self) -> u64 {
        self.offset + self.data_block.current_size_estimate() as u64
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finish writing the table
    ///
    /// Writes the last data block, the filter block, the index block and
    /// the footer, then syncs the file.
    pub fn finish(mut self) -> Result<TableSummary> {
        self.flush_data_block()?;

        let filter = if self.bloom_bits_per_key > 0 {
            let filter = std::mem::take(&mut self.filter).finish(self.bloom_bits_per_key);
            self.write_block(&filter.encode(), CompressionType::None)?
        } else {
            BlockHandle::default()
        };

        let index_contents = self.index_block.finish();
        let index = self.write_block(&index_contents, self.compression)?;

        let footer = Footer { filter, index }.encode();
        self.writer.write_all(&footer)?;
        self.offset += footer.len() as u64;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        tracing::debug!(
            path = %self.path.display(),
            entries = self.entry_count,
            bytes = self.offset,
            "Finished table"
        );

        Ok(TableSummary {
            file_size: self.offset,
            entry_count: self.entry_count,
            smallest: self.smallest.unwrap_or_default(),
            largest: self.largest,
        })
    }

    /// Stop building and remove the partial file
    pub fn abandon(self) -> Result<()> {
        let path = self.path.clone();
        drop(self);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let last_key = self.data_block.last_key().to_vec();
        let contents = self.data_block.finish();
        let handle = self.write_block(&contents, self.compression)?;

        let mut encoded = Vec::with_capacity(BlockHandle::ENCODED_LEN);
        handle.encode_to(&mut encoded);
        self.index_block.add(&last_key, &encoded);
        Ok(())
    }

    /// Write block contents plus trailer `[compression][crc32]`
    ///
    /// LZ4 output is only kept when it saves at least 1/8 of the block.
    fn write_block(&mut self, raw: &[u8], compression: CompressionType) -> Result<BlockHandle> {
        let compressed;
        let (contents, used) = match compression {
            CompressionType::Lz4 => {
                compressed = lz4_flex::block::compress_prepend_size(raw);
                if compressed.len() < raw.len() - raw.len() / 8 {
                    (compressed.as_slice(), CompressionType::Lz4)
                } else {
                    (raw, CompressionType::None)
                }
            }
            CompressionType::None => (raw, CompressionType::None),
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(contents);
        hasher.update(&[used.tag()]);

        let mut trailer = Vec::with_capacity(super::BLOCK_TRAILER_SIZE);
        trailer.put_u8(used.tag());
        trailer.put_u32_le(hasher.finalize());

        self.writer.write_all(contents)?;
        self.writer.write_all(&trailer)?;

        let handle = BlockHandle::new(self.offset, contents.len() as u64);
        self.offset += (contents.len() + trailer.len()) as u64;
        Ok(handle)
    }
}
