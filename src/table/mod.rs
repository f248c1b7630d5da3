//! Table Module
//!
//! Immutable, sorted on-disk runs of internal entries.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Block 1 .. N                                       │
//! │   prefix-compressed entries + restart array             │
//! │   Trailer: Compression (1) | CRC32 (4)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │ Filter Block                                            │
//! │   bloom filter over the user keys of the table          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block                                             │
//! │   last internal key of block i → BlockHandle(i)         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (40 bytes)                                       │
//! │   FilterHandle (16) | IndexHandle (16) | Magic: u64 (8) │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Block Entry Format
//! ```text
//! [shared: u32][non_shared: u32][value_len: u32][key delta][value]
//! ```
//! Every `block_restart_interval` entries the key is stored whole; the
//! offsets of those restart points close the block, followed by their count.

mod block;
mod builder;
mod cache;
mod filter;
mod iterator;
mod reader;

use bytes::{Buf, BufMut};

pub use block::{Block, BlockBuilder, BlockIterator};
pub use builder::{TableBuilder, TableSummary};
pub use cache::{BlockCache, TableCache};
pub use filter::{BloomFilter, FilterBuilder};
pub use iterator::TableIterator;
pub use reader::Table;

use crate::error::{Result, StrataError};

// =============================================================================
// Shared Constants (used by builder, reader, iterator)
// =============================================================================

/// Magic number closing every table file ("STRATAKV")
pub(crate) const MAGIC: u64 = 0x5354_5241_5441_4b56;

/// Block trailer: Compression (1) + CRC32 (4)
pub(crate) const BLOCK_TRAILER_SIZE: usize = 5;

/// Footer size: FilterHandle (16) + IndexHandle (16) + Magic (8)
pub(crate) const FOOTER_SIZE: usize = 2 * BlockHandle::ENCODED_LEN + 8;

// =============================================================================
// Block Handle & Footer
// =============================================================================

/// Location of a block inside a table file
///
/// `size` excludes the block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u64,
}

impl BlockHandle {
    pub const ENCODED_LEN: usize = 16;

    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn encode_to(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.offset);
        buf.put_u64_le(self.size);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        self.encode_to(&mut buf);
        buf
    }

    pub fn decode(mut src: &[u8]) -> Result<Self> {
        if src.remaining() < Self::ENCODED_LEN {
            return Err(StrataError::corruption("truncated block handle"));
        }
        Ok(Self {
            offset: src.get_u64_le(),
            size: src.get_u64_le(),
        })
    }
}

/// Fixed-size tail of a table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footer {
    pub filter: BlockHandle,
    pub index: BlockHandle,
}

impl Footer {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        self.filter.encode_to(&mut buf);
        self.index.encode_to(&mut buf);
        buf.put_u64_le(MAGIC);
        buf
    }

    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() != FOOTER_SIZE {
            return Err(StrataError::corruption(format!(
                "table footer must be {} bytes, got {}",
                FOOTER_SIZE,
                src.len()
            )));
        }

        let mut magic = &src[2 * BlockHandle::ENCODED_LEN..];
        let magic = magic.get_u64_le();
        if magic != MAGIC {
            return Err(StrataError::corruption(format!(
                "bad table magic number: {:#x}",
                magic
            )));
        }

        Ok(Self {
            filter: BlockHandle::decode(&src[..BlockHandle::ENCODED_LEN])?,
            index: BlockHandle::decode(&src[BlockHandle::ENCODED_LEN..])?,
        })
    }
}
