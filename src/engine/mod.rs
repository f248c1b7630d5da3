//! Engine Module
//!
//! The storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Serialize writes: WAL append, then memtable insert, then publish the
//!   new last sequence
//! - Serve reads from memtables and table files without blocking writers
//! - Freeze full memtables and hand them to the background worker
//! - Recover the version and the WALs on open
//!
//! ## Concurrency Model: Single-Writer / Multiple-Reader
//!
//! - **Writes** take the `writer` mutex for the whole batch. Only the
//!   background worker and the writer install new super versions.
//! - **Reads** take the `super_version` read guard just long enough to
//!   clone an `Arc`; no lock is held during I/O.
//! - **Background** work runs on one worker thread. It installs versions
//!   through the `versions` mutex and wakes stalled writers through
//!   `progress`.

mod background;
mod info_log;
mod lock;
mod maintenance;
mod open;
mod properties;
mod read;
mod registry;
mod write;

pub use maintenance::{destroy, repair, RepairReport};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::batch::WriteBatch;
use crate::compaction::{CompactionStats, Task, Worker};
use crate::config::{Config, IteratorOptions, ReadOptions, WriteOptions, NUM_LEVELS};
use crate::error::{Result, StrataError};
use crate::iterator::DbIterator;
use crate::key::SequenceNumber;
use crate::memtable::MemTable;
use crate::snapshot::{Snapshot, SnapshotList};
use crate::table::TableCache;
use crate::version::{Version, VersionSet};
use crate::wal::WalWriter;

use info_log::InfoLog;
use lock::LockFile;

/// A memtable waiting to be flushed
pub(crate) struct ImmutableMemTable {
    table: Arc<MemTable>,
    /// WAL of the memtable that replaced this one
    next_log_number: u64,
    /// Last sequence written before the freeze
    last_sequence: SequenceNumber,
}

/// Everything a read needs, swapped as a unit
#[derive(Clone)]
pub(crate) struct SuperVersion {
    mem: Arc<MemTable>,
    /// Oldest first
    imms: Vec<Arc<ImmutableMemTable>>,
    version: Arc<Version>,
}

struct WriteState {
    wal: WalWriter,
    log_number: u64,
}

/// State shared by every handle on one open location
pub(crate) struct EngineInner {
    dir: PathBuf,
    registry_key: PathBuf,
    config: Config,

    /// Cleared by shutdown; iterators watch it too
    open: Arc<AtomicBool>,
    lock: Mutex<Option<LockFile>>,
    info_log: InfoLog,

    table_cache: Arc<TableCache>,
    versions: Mutex<VersionSet>,
    super_version: RwLock<Arc<SuperVersion>>,

    /// The write mutex
    writer: Mutex<WriteState>,
    last_sequence: AtomicU64,
    snapshots: Arc<SnapshotList>,

    /// Sticky failure that makes further writes unsafe
    background_error: Mutex<Option<String>>,

    /// Bumped after each background job; stalled writers wait on it
    progress: Mutex<u64>,
    progress_cv: Condvar,

    stats: Mutex<[CompactionStats; NUM_LEVELS]>,
    worker: Mutex<Option<Worker>>,
}

impl EngineInner {
    pub(crate) fn registry_key(&self) -> &Path {
        &self.registry_key
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if !self.is_open() {
            return Err(StrataError::NotOpen);
        }
        Ok(())
    }

    fn current_super_version(&self) -> Arc<SuperVersion> {
        Arc::clone(&self.super_version.read())
    }

    fn schedule(&self, task: Task) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.schedule(task);
        }
    }

    fn signal_progress(&self) {
        *self.progress.lock() += 1;
        self.progress_cv.notify_all();
    }

    /// Stop background work, sync the WAL and release the lock file
    ///
    /// The active memtable is not flushed: its WAL is replayed on the next
    /// open.
    pub(crate) fn shutdown(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        // Wake writers stalled on background progress
        self.signal_progress();

        // The worker may schedule itself follow-up work: do not hold the slot
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.shutdown();
        }

        let result = self.writer.lock().wal.sync();
        self.lock.lock().take();

        self.info_log.log(format_args!("Closed"));
        tracing::info!(location = %self.dir.display(), "Engine closed");
        result
    }
}

/// Handle on an open database
///
/// Handles are cheap to keep around; every operation on a closed handle
/// fails with `StrataError::NotOpen`. Dropping a handle closes it.
///
/// ```no_run
/// use stratakv::{Config, Engine, IteratorOptions};
///
/// let engine = Engine::open(Config::builder().location("/tmp/db").build())?;
/// engine.put(b"a", b"1")?;
/// assert_eq!(engine.get(b"a")?, Some(b"1".to_vec()));
///
/// for entry in engine.iter(IteratorOptions::range("a", "z"))? {
///     let (key, value) = entry?;
///     println!("{:?} = {:?}", key, value);
/// }
/// engine.close()?;
/// # Ok::<(), stratakv::StrataError>(())
/// ```
pub struct Engine {
    inner: Arc<EngineInner>,
    closed: AtomicBool,
}

impl Engine {
    /// Open or create the database at `config.location`
    ///
    /// On startup:
    /// 1. Create the directory (if allowed) and take the lock file
    /// 2. Recover the version from the manifest named by `CURRENT`
    /// 3. Replay the WALs newer than the manifest into level-0 tables
    /// 4. Start a fresh WAL and the background worker
    pub fn open(config: Config) -> Result<Self> {
        let inner = registry::acquire(config)?;
        Ok(Self {
            inner,
            closed: AtomicBool::new(false),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified location
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().location(path).build())
    }

    /// Close this handle
    ///
    /// The last handle on a location waits for running background work,
    /// syncs the WAL and releases the lock. Closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        registry::release(&self.inner)
    }

    fn inner(&self) -> Result<&EngineInner> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::NotOpen);
        }
        self.inner.check_open()?;
        Ok(&self.inner)
    }

    pub fn location(&self) -> &Path {
        &self.inner.dir
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Put a key-value pair
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_with(key, value, WriteOptions::default())
    }

    pub fn put_with(&self, key: &[u8], value: &[u8], options: WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch, options)
    }

    /// Delete a key; deleting an absent key succeeds
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.delete_with(key, WriteOptions::default())
    }

    pub fn delete_with(&self, key: &[u8], options: WriteOptions) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch, options)
    }

    /// Apply a batch atomically
    ///
    /// Either every operation becomes visible or, on error, none does.
    pub fn write(&self, batch: WriteBatch, options: WriteOptions) -> Result<()> {
        self.inner()?.write(batch, options)
    }

    /// Delete every key the range options select
    ///
    /// Returns the number of keys deleted.
    pub fn clear(&self, options: IteratorOptions<'_>) -> Result<u64> {
        self.inner()?.clear(options)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Latest value of `key`, or `None` if absent or deleted
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_with(key, &ReadOptions::default())
    }

    pub fn get_with(&self, key: &[u8], options: &ReadOptions<'_>) -> Result<Option<Vec<u8>>> {
        self.inner()?.get(key, options)
    }

    /// Values of several keys read at one sequence number
    pub fn get_many<K: AsRef<[u8]>>(
        &self,
        keys: &[K],
        options: &ReadOptions<'_>,
    ) -> Result<Vec<Option<Vec<u8>>>> {
        self.inner()?.get_many(keys, options)
    }

    pub fn has(&self, key: &[u8], options: &ReadOptions<'_>) -> Result<bool> {
        Ok(self.inner()?.get(key, options)?.is_some())
    }

    pub fn has_many<K: AsRef<[u8]>>(
        &self,
        keys: &[K],
        options: &ReadOptions<'_>,
    ) -> Result<Vec<bool>> {
        let values = self.inner()?.get_many(keys, options)?;
        Ok(values.into_iter().map(|v| v.is_some()).collect())
    }

    /// Ordered cursor over the keys the options select
    pub fn iter(&self, options: IteratorOptions<'_>) -> Result<DbIterator> {
        self.inner()?.iter(&options)
    }

    // =========================================================================
    // Snapshots
    // =========================================================================

    /// Pin the current sequence number for consistent reads
    pub fn snapshot(&self) -> Result<Snapshot> {
        let inner = self.inner()?;
        Ok(Snapshot::latest(&inner.snapshots, &inner.last_sequence))
    }

    /// Release a snapshot before it is dropped
    pub fn release_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let inner = self.inner()?;
        if !snapshot.belongs_to(&inner.snapshots) {
            return Err(StrataError::InvalidArgument(
                "snapshot belongs to another database".to_string(),
            ));
        }
        snapshot.release();
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Approximate bytes of table data holding keys in `[start, end)`
    ///
    /// Data still in memtables is not counted.
    pub fn approximate_size(&self, start: &[u8], end: &[u8]) -> Result<u64> {
        self.inner()?.approximate_size(start, end)
    }

    /// Flush the memtable and compact every level overlapping
    /// `[begin, end]` down the tree; `None` is unbounded
    ///
    /// Blocks until the compaction is done.
    pub fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        self.inner()?.request_compact_range(begin, end)
    }

    /// Diagnostic property, or `None` for an unknown name
    ///
    /// Supported: `leveldb.num-files-at-level<N>`, `leveldb.stats`,
    /// `leveldb.sstables`, `leveldb.approximate-memory-usage`.
    pub fn get_property(&self, name: &str) -> Result<Option<String>> {
        Ok(self.inner()?.property(name))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "Failed to close engine");
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("location", &self.inner.dir)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
