//! Bloom filter over the user keys of one table
//!
//! - If any checked bit is 0 → key is DEFINITELY NOT in the table
//! - If all checked bits are 1 → key is PROBABLY in the table
//!
//! Double hashing: `h_i = h1 + i * h2 (mod m)`, with h1 and h2 the two
//! halves of a 128-bit xxh3 hash.
//!
//! ## Encoding
//! ```text
//! [bit array: num_words * u64 LE][num_bits: u32][num_hashes: u32]
//! ```

use bytes::{Buf, BufMut};
use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Result, StrataError};

/// Trailer of an encoded filter: num_bits (4) + num_hashes (4)
const FILTER_TRAILER_SIZE: usize = 8;

fn hash_key(key: &[u8]) -> (u64, u64) {
    let hash128 = xxh3_128(key);
    (hash128 as u64, (hash128 >> 64) as u64)
}

/// Collects key hashes while a table is being written
#[derive(Debug, Default)]
pub struct FilterBuilder {
    hashes: Vec<(u64, u64)>,
    last_key: Option<Vec<u8>>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user key; consecutive duplicates are counted once
    pub fn add_key(&mut self, user_key: &[u8]) {
        if self.last_key.as_deref() == Some(user_key) {
            return;
        }
        self.hashes.push(hash_key(user_key));
        self.last_key = Some(user_key.to_vec());
    }

    pub fn key_count(&self) -> usize {
        self.hashes.len()
    }

    pub fn finish(self, bits_per_key: usize) -> BloomFilter {
        let mut filter = BloomFilter::with_capacity(self.hashes.len(), bits_per_key);
        for (h1, h2) in self.hashes {
            filter.insert_hashed(h1, h2);
        }
        filter
    }
}

/// Probabilistic "is this key in the table?" check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: u32,
    num_hashes: u32,
}

impl BloomFilter {
    /// Size a filter for `expected_keys` at `bits_per_key`
    ///
    /// `num_hashes = bits_per_key * ln(2)`, clamped to `1..=30`.
    pub fn with_capacity(expected_keys: usize, bits_per_key: usize) -> Self {
        let num_bits = (expected_keys.saturating_mul(bits_per_key)).max(64) as u32;
        let num_hashes = ((bits_per_key as f64) * std::f64::consts::LN_2).round() as u32;
        let num_hashes = num_hashes.clamp(1, 30);

        let num_words = (num_bits as usize).div_ceil(64);
        Self {
            bits: vec![0u64; num_words],
            num_bits,
            num_hashes,
        }
    }

    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_key(key);
        self.insert_hashed(h1, h2);
    }

    fn insert_hashed(&mut self, h1: u64, h2: u64) {
        for i in 0..self.num_hashes {
            let pos = self.position(h1, h2, i);
            self.bits[pos / 64] |= 1 << (pos % 64);
        }
    }

    /// false → definitely absent. true → probably present.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_key(key);
        (0..self.num_hashes).all(|i| {
            let pos = self.position(h1, h2, i);
            (self.bits[pos / 64] >> (pos % 64)) & 1 == 1
        })
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> usize {
        (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits as u64) as usize
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.bits.len() * 8 + FILTER_TRAILER_SIZE);
        for word in &self.bits {
            buf.put_u64_le(*word);
        }
        buf.put_u32_le(self.num_bits);
        buf.put_u32_le(self.num_hashes);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FILTER_TRAILER_SIZE {
            return Err(StrataError::corruption("filter block too short"));
        }
        let (words, mut trailer) = data.split_at(data.len() - FILTER_TRAILER_SIZE);
        let num_bits = trailer.get_u32_le();
        let num_hashes = trailer.get_u32_le();

        if num_bits == 0
            || words.len() % 8 != 0
            || words.len() / 8 != (num_bits as usize).div_ceil(64)
        {
            return Err(StrataError::corruption(format!(
                "filter block of {} bytes does not hold {} bits",
                data.len(),
                num_bits
            )));
        }

        let mut words = words;
        let mut bits = Vec::with_capacity(words.len() / 8);
        while words.has_remaining() {
            bits.push(words.get_u64_le());
        }

        Ok(Self {
            bits,
            num_bits,
            num_hashes,
        })
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }
}
