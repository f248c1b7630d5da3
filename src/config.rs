//! Configuration for StrataKV
//!
//! Centralized configuration with sensible defaults, plus the per-call
//! read, write and iterator options.

use std::path::PathBuf;

use crate::snapshot::Snapshot;

/// Number of levels in the LSM tree
pub const NUM_LEVELS: usize = 7;

/// Main configuration for a StrataKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Location Configuration
    // -------------------------------------------------------------------------
    /// Directory holding all database files
    /// Internal structure:
    ///   {location}/
    ///     ├── CURRENT          (name of the live manifest)
    ///     ├── MANIFEST-000001  (version edit log)
    ///     ├── 000003.log       (write-ahead log)
    ///     ├── 000004.ldb       (table files)
    ///     ├── LOCK
    ///     └── LOG
    pub location: PathBuf,

    /// Create the database if it does not exist
    pub create_if_missing: bool,

    /// Fail to open if the database already exists
    pub error_if_exists: bool,

    /// Share one engine instance between handles opened in this process
    pub multithreading: bool,

    /// Treat any checksum mismatch as fatal, including a torn WAL tail
    pub paranoid_checks: bool,

    // -------------------------------------------------------------------------
    // Table Configuration
    // -------------------------------------------------------------------------
    /// Block compression for new tables
    pub compression: CompressionType,

    /// Block cache capacity (in bytes)
    pub cache_size: usize,

    /// Target uncompressed size of a data block (in bytes)
    pub block_size: usize,

    /// Number of keys between restart points in a block
    pub block_restart_interval: usize,

    /// Maximum number of table files kept open
    pub max_open_files: usize,

    /// Target size of a table file produced by compaction (in bytes)
    pub max_file_size: u64,

    /// Bloom filter bits per key (0 disables filters)
    pub bloom_bits_per_key: usize,

    // -------------------------------------------------------------------------
    // MemTable Configuration
    // -------------------------------------------------------------------------
    /// Max size of memtable before flush (in bytes)
    pub write_buffer_size: usize,

    /// Number of frozen memtables allowed before writers stall
    pub max_immutable_memtables: usize,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Level-0 file count that triggers a compaction
    pub level0_compaction_trigger: usize,

    /// Level-0 file count at which each write is delayed by 1ms
    pub level0_slowdown_writes_trigger: usize,

    /// Level-0 file count at which writes stop until compaction catches up
    pub level0_stop_writes_trigger: usize,

    /// Size budget of level 1 (in bytes)
    pub base_level_size: u64,

    /// Size ratio between consecutive levels
    pub level_size_multiplier: u64,
}

/// Block compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Lz4,
}

impl CompressionType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            CompressionType::None => 0,
            CompressionType::Lz4 => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Lz4),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            location: PathBuf::from("./stratakv_data"),
            create_if_missing: true,
            error_if_exists: false,
            multithreading: false,
            paranoid_checks: false,
            compression: CompressionType::Lz4,
            cache_size: 8 * 1024 * 1024, // 8 MB
            block_size: 4096,
            block_restart_interval: 16,
            max_open_files: 1000,
            max_file_size: 2 * 1024 * 1024, // 2 MB
            bloom_bits_per_key: 10,
            write_buffer_size: 4 * 1024 * 1024, // 4 MB
            max_immutable_memtables: 1,
            level0_compaction_trigger: 4,
            level0_slowdown_writes_trigger: 8,
            level0_stop_writes_trigger: 12,
            base_level_size: 10 * 1024 * 1024, // 10 MB
            level_size_multiplier: 10,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Size budget for `level` (levels >= 1)
    pub(crate) fn max_bytes_for_level(&self, level: usize) -> u64 {
        let mut result = self.base_level_size;
        for _ in 1..level {
            result = result.saturating_mul(self.level_size_multiplier);
        }
        result
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database location
    pub fn location(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.location = path.into();
        self
    }

    pub fn create_if_missing(mut self, yes: bool) -> Self {
        self.config.create_if_missing = yes;
        self
    }

    pub fn error_if_exists(mut self, yes: bool) -> Self {
        self.config.error_if_exists = yes;
        self
    }

    /// Allow several handles in this process to share one engine
    pub fn multithreading(mut self, yes: bool) -> Self {
        self.config.multithreading = yes;
        self
    }

    pub fn paranoid_checks(mut self, yes: bool) -> Self {
        self.config.paranoid_checks = yes;
        self
    }

    /// Set the block compression (`true` selects LZ4)
    pub fn compression(mut self, yes: bool) -> Self {
        self.config.compression = if yes {
            CompressionType::Lz4
        } else {
            CompressionType::None
        };
        self
    }

    /// Set the block cache capacity (in bytes)
    pub fn cache_size(mut self, size: usize) -> Self {
        self.config.cache_size = size;
        self
    }

    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.config.block_restart_interval = interval.max(1);
        self
    }

    pub fn max_open_files(mut self, count: usize) -> Self {
        self.config.max_open_files = count;
        self
    }

    pub fn max_file_size(mut self, size: u64) -> Self {
        self.config.max_file_size = size;
        self
    }

    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.config.bloom_bits_per_key = bits;
        self
    }

    /// Set the memtable size limit (in bytes)
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.config.write_buffer_size = size;
        self
    }

    pub fn max_immutable_memtables(mut self, count: usize) -> Self {
        self.config.max_immutable_memtables = count.max(1);
        self
    }

    pub fn level0_compaction_trigger(mut self, count: usize) -> Self {
        self.config.level0_compaction_trigger = count.max(1);
        self
    }

    pub fn level0_slowdown_writes_trigger(mut self, count: usize) -> Self {
        self.config.level0_slowdown_writes_trigger = count;
        self
    }

    pub fn level0_stop_writes_trigger(mut self, count: usize) -> Self {
        self.config.level0_stop_writes_trigger = count;
        self
    }

    pub fn base_level_size(mut self, size: u64) -> Self {
        self.config.base_level_size = size;
        self
    }

    pub fn level_size_multiplier(mut self, ratio: u64) -> Self {
        self.config.level_size_multiplier = ratio.max(2);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Per-call Options
// =============================================================================

/// Options for point reads
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions<'a> {
    /// Read as of this snapshot instead of the latest state
    pub snapshot: Option<&'a Snapshot>,

    /// Insert blocks read by this call into the block cache
    pub fill_cache: bool,
}

impl Default for ReadOptions<'_> {
    fn default() -> Self {
        Self {
            snapshot: None,
            fill_cache: true,
        }
    }
}

/// Options for writes
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// fsync the WAL before acknowledging the write
    pub sync: bool,
}

/// Options for range iteration and range deletion
///
/// `gte` and `lte` take precedence over `gt` and `lt` respectively.
#[derive(Debug, Clone)]
pub struct IteratorOptions<'a> {
    pub gt: Option<Vec<u8>>,
    pub gte: Option<Vec<u8>>,
    pub lt: Option<Vec<u8>>,
    pub lte: Option<Vec<u8>>,

    /// Yield keys in descending order
    pub reverse: bool,

    /// Maximum number of entries to yield
    pub limit: Option<usize>,

    pub snapshot: Option<&'a Snapshot>,

    pub fill_cache: bool,

    /// Soft cap on key+value bytes returned by one `next_batch` call
    pub high_water_mark_bytes: usize,
}

impl Default for IteratorOptions<'_> {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            reverse: false,
            limit: None,
            snapshot: None,
            fill_cache: false,
            high_water_mark_bytes: 16 * 1024,
        }
    }
}

impl<'a> IteratorOptions<'a> {
    /// Iterate keys in `[start, end)`
    pub fn range(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            gte: Some(start.into()),
            lt: Some(end.into()),
            ..Self::default()
        }
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn snapshot(mut self, snapshot: &'a Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }
}
