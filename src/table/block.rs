//! Data and index blocks
//!
//! Entries are prefix-compressed against the previous key. Restart points
//! store the full key so a reader can binary-search them and walk forward
//! from there.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::error::{Result, StrataError};
use crate::iterator::InternalIterator;
use crate::key::compare_internal;

/// Entry header: shared (4) + non_shared (4) + value_len (4)
const ENTRY_HEADER_SIZE: usize = 12;

// =============================================================================
// Builder
// =============================================================================

/// Accumulates sorted entries into one encoded block
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    /// Entries emitted since the last restart point
    counter: usize,
    restart_interval: usize,
    last_key: Vec<u8>,
    entry_count: usize,
}

impl BlockBuilder {
    pub fn new(restart_interval: usize) -> Self {
        Self {
            buffer: Vec::new(),
            restarts: vec![0],
            counter: 0,
            restart_interval: restart_interval.max(1),
            last_key: Vec::new(),
            entry_count: 0,
        }
    }

    /// Append an entry; keys must arrive in increasing internal-key order
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(
            self.entry_count == 0 || compare_internal(key, &self.last_key) == Ordering::Greater,
            "block keys must be added in increasing order"
        );

        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key.iter())
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };
        let non_shared = key.len() - shared;

        self.buffer.put_u32_le(shared as u32);
        self.buffer.put_u32_le(non_shared as u32);
        self.buffer.put_u32_le(value.len() as u32);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.truncate(shared);
        self.last_key.extend_from_slice(&key[shared..]);
        self.counter += 1;
        self.entry_count += 1;
    }

    /// Size of the block if it were finished now
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Last key added since the previous `finish`
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }

    /// Append the restart array and hand out the encoded block, leaving the
    /// builder empty for the next block
    pub fn finish(&mut self) -> Vec<u8> {
        for restart in &self.restarts {
            self.buffer.put_u32_le(*restart);
        }
        self.buffer.put_u32_le(self.restarts.len() as u32);

        let block = std::mem::take(&mut self.buffer);
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.entry_count = 0;
        block
    }
}

// =============================================================================
// Decoded Block
// =============================================================================

/// An uncompressed, checksum-verified block
#[derive(Debug)]
pub struct Block {
    data: Vec<u8>,
    /// Offset of the restart array; entries live in `data[..restart_offset]`
    restart_offset: usize,
    num_restarts: usize,
}

impl Block {
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(StrataError::corruption("block too short"));
        }
        let mut tail = &data[data.len() - 4..];
        let num_restarts = tail.get_u32_le() as usize;

        let max_restarts = (data.len() - 4) / 4;
        if num_restarts > max_restarts {
            return Err(StrataError::corruption(format!(
                "block claims {} restart points but holds {} bytes",
                num_restarts,
                data.len()
            )));
        }

        let restart_offset = data.len() - 4 - num_restarts * 4;
        Ok(Self {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Size of the uncompressed block in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn iter(self: &Arc<Self>) -> BlockIterator {
        BlockIterator::new(Arc::clone(self))
    }

    fn restart_point(&self, index: usize) -> usize {
        let start = self.restart_offset + index * 4;
        let mut raw = &self.data[start..start + 4];
        raw.get_u32_le() as usize
    }

    /// Decode the entry header at `offset`:
    /// `(shared, non_shared, value_len, key delta offset)`
    fn decode_entry(&self, offset: usize) -> Option<(usize, usize, usize, usize)> {
        let limit = self.restart_offset;
        if offset + ENTRY_HEADER_SIZE > limit {
            return None;
        }
        let mut header = &self.data[offset..offset + ENTRY_HEADER_SIZE];
        let shared = header.get_u32_le() as usize;
        let non_shared = header.get_u32_le() as usize;
        let value_len = header.get_u32_le() as usize;

        let delta = offset + ENTRY_HEADER_SIZE;
        if delta + non_shared + value_len > limit {
            return None;
        }
        Some((shared, non_shared, value_len, delta))
    }
}

// =============================================================================
// Iterator
// =============================================================================

/// Bidirectional cursor over one block
pub struct BlockIterator {
    block: Arc<Block>,
    /// Offset of the current entry; `restart_offset` when invalid
    current: usize,
    /// Restart point at or before `current`
    restart_index: usize,
    key: Vec<u8>,
    value_start: usize,
    value_len: usize,
}

impl BlockIterator {
    fn new(block: Arc<Block>) -> Self {
        let restart_offset = block.restart_offset;
        let num_restarts = block.num_restarts;
        Self {
            block,
            current: restart_offset,
            restart_index: num_restarts,
            key: Vec::new(),
            value_start: 0,
            value_len: 0,
        }
    }

    fn next_entry_offset(&self) -> usize {
        self.value_start + self.value_len
    }

    fn invalidate(&mut self) {
        self.current = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
        self.key.clear();
        self.value_len = 0;
    }

    fn seek_to_restart_point(&mut self, index: usize) {
        self.key.clear();
        self.restart_index = index;
        // `next_entry_offset` now points at the restart entry
        self.value_start = self.block.restart_point(index);
        self.value_len = 0;
    }

    /// Decode the entry following the current one; `Ok(false)` at the end
    fn parse_next_key(&mut self) -> Result<bool> {
        self.current = self.next_entry_offset();
        if self.current >= self.block.restart_offset {
            self.invalidate();
            return Ok(false);
        }

        let (shared, non_shared, value_len, delta) =
            match self.block.decode_entry(self.current) {
                Some(entry) if entry.0 <= self.key.len() => entry,
                _ => {
                    let offset = self.current;
                    self.invalidate();
                    return Err(StrataError::corruption(format!(
                        "bad block entry at offset {}",
                        offset
                    )));
                }
            };

        self.key.truncate(shared);
        self.key
            .extend_from_slice(&self.block.data[delta..delta + non_shared]);
        self.value_start = delta + non_shared;
        self.value_len = value_len;

        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }
        Ok(true)
    }

    /// Full key stored at restart point `index`
    fn restart_key(&self, index: usize) -> Result<&[u8]> {
        let offset = self.block.restart_point(index);
        match self.block.decode_entry(offset) {
            Some((0, non_shared, _, delta)) => Ok(&self.block.data[delta..delta + non_shared]),
            _ => Err(StrataError::corruption(format!(
                "bad restart point {} at offset {}",
                index, offset
            ))),
        }
    }
}

impl InternalIterator for BlockIterator {
    fn valid(&self) -> bool {
        self.current < self.block.restart_offset
    }

    fn seek_to_first(&mut self) -> Result<()> {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return Ok(());
        }
        self.seek_to_restart_point(0);
        self.parse_next_key()?;
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return Ok(());
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key()? && self.next_entry_offset() < self.block.restart_offset {}
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return Ok(());
        }

        // Last restart point whose key is < target
        let mut left = 0;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            if compare_internal(self.restart_key(mid)?, target) == Ordering::Less {
                left = mid;
            } else {
                right = mid - 1;
            }
        }

        self.seek_to_restart_point(left);
        while self.parse_next_key()? {
            if compare_internal(&self.key, target) != Ordering::Less {
                break;
            }
        }
        Ok(())
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<()> {
        self.seek(target)?;
        if !self.valid() {
            self.seek_to_last()
        } else if compare_internal(&self.key, target) == Ordering::Greater {
            self.prev()
        } else {
            Ok(())
        }
    }

    fn next(&mut self) -> Result<()> {
        if self.valid() {
            self.parse_next_key()?;
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        if !self.valid() {
            return Ok(());
        }

        let original = self.current;
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                self.invalidate();
                return Ok(());
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_key()? && self.next_entry_offset() < original {}
        Ok(())
    }

    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &[u8] {
        if !self.valid() {
            return &[];
        }
        &self.block.data[self.value_start..self.value_start + self.value_len]
    }
}
