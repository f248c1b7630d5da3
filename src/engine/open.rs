//! Opening and recovery

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use super::{EngineInner, InfoLog, LockFile, SuperVersion, WriteState};
use crate::compaction::{build_table, Task, Worker};
use crate::config::{Config, NUM_LEVELS};
use crate::error::{Result, StrataError};
use crate::filename::{log_file_name, parse_file_name, FileType, CURRENT};
use crate::key::SequenceNumber;
use crate::memtable::{MemTable, MemTableIterator};
use crate::snapshot::SnapshotList;
use crate::table::{BlockCache, TableCache};
use crate::version::{VersionEdit, VersionSet};
use crate::wal::{WalRecovery, WalWriter};

impl EngineInner {
    pub(super) fn open(config: Config, registry_key: PathBuf) -> Result<Arc<Self>> {
        let dir = config.location.clone();

        // Step 1: Check existence against the create/exists options
        let exists = dir.join(CURRENT).exists();
        if !exists {
            if !config.create_if_missing {
                return Err(StrataError::InvalidArgument(format!(
                    "{} does not exist (create_if_missing is false)",
                    dir.display()
                )));
            }
            fs::create_dir_all(&dir)?;
        } else if config.error_if_exists {
            return Err(StrataError::InvalidArgument(format!(
                "{} exists (error_if_exists is true)",
                dir.display()
            )));
        }

        // Step 2: Exclude other handles and processes
        let lock = LockFile::acquire(&dir)?;
        let info_log = InfoLog::open(&dir)?;
        if !exists {
            VersionSet::create_new(&dir)?;
            info_log.log(format_args!("Created database"));
        }

        // Step 3: Rebuild the version from the manifest
        let block_cache = Arc::new(BlockCache::new(config.cache_size, config.block_size));
        let table_cache = Arc::new(TableCache::new(
            &dir,
            config.max_open_files,
            block_cache,
            config.paranoid_checks,
        ));
        let mut versions = VersionSet::new(&dir, &config, Arc::clone(&table_cache));
        versions.recover()?;

        // Step 4: Replay WALs the manifest does not cover into level 0
        let mut edit = VersionEdit::new();
        let recovered_sequence = recover_logs(&dir, &config, &mut versions, &mut edit)?;
        let last_sequence = versions.last_sequence().max(recovered_sequence);

        // Step 5: Start a fresh WAL and record it with the recovered tables
        let log_number = versions.new_file_number();
        let wal = WalWriter::open(&dir.join(log_file_name(log_number)))?;
        edit.set_log_number(log_number);
        edit.set_prev_log_number(0);
        edit.set_last_sequence(last_sequence);
        let version = versions.log_and_apply(edit)?;

        info_log.log(format_args!(
            "Opened: log #{}, last sequence {}, {} tables",
            log_number,
            last_sequence,
            version.total_files()
        ));
        tracing::info!(
            location = %dir.display(),
            log_number,
            last_sequence,
            tables = version.total_files(),
            "Engine opened"
        );

        let inner = Arc::new(Self {
            dir,
            registry_key,
            config,
            open: Arc::new(AtomicBool::new(true)),
            lock: Mutex::new(Some(lock)),
            info_log,
            table_cache,
            versions: Mutex::new(versions),
            super_version: RwLock::new(Arc::new(SuperVersion {
                mem: Arc::new(MemTable::new()),
                imms: Vec::new(),
                version,
            })),
            writer: Mutex::new(WriteState { wal, log_number }),
            last_sequence: AtomicU64::new(last_sequence),
            snapshots: Arc::new(SnapshotList::new()),
            background_error: Mutex::new(None),
            progress: Mutex::new(0),
            progress_cv: Condvar::new(),
            stats: Mutex::new([Default::default(); NUM_LEVELS]),
            worker: Mutex::new(None),
        });

        // Step 6: Clean up, then hand background work to the worker
        inner.delete_obsolete_files();
        let worker = Worker::spawn(Arc::downgrade(&inner))?;
        *inner.worker.lock() = Some(worker);
        inner.schedule(Task::Compact);

        Ok(inner)
    }
}

/// Replay every WAL at or after the manifest's log number, writing the
/// recovered entries to level-0 tables recorded in `edit`
///
/// Returns the highest sequence number replayed.
fn recover_logs(
    dir: &std::path::Path,
    config: &Config,
    versions: &mut VersionSet,
    edit: &mut VersionEdit,
) -> Result<SequenceNumber> {
    let min_log = versions.log_number();
    let prev_log = versions.prev_log_number();

    let mut logs: Vec<u64> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| match parse_file_name(&entry.file_name().to_string_lossy()) {
            Some(FileType::Log(number)) if number >= min_log || number == prev_log => Some(number),
            _ => None,
        })
        .collect();
    logs.sort_unstable();

    let watermark = versions.last_sequence();
    let mut max_sequence = watermark;

    for number in logs {
        versions.mark_file_number_used(number);
        let path = dir.join(log_file_name(number));

        let mut mem = Arc::new(MemTable::new());
        let mut pending: Vec<Arc<MemTable>> = Vec::new();
        let result = WalRecovery::replay(&path, watermark, config.paranoid_checks, |entry| {
            if mem.apply(&entry) >= config.write_buffer_size {
                pending.push(std::mem::replace(&mut mem, Arc::new(MemTable::new())));
            }
            Ok(())
        })?;
        if !mem.is_empty() {
            pending.push(mem);
        }

        for table in pending {
            let file_number = versions.new_file_number();
            let mut iter = MemTableIterator::new(table);
            if let Some(meta) = build_table(dir, file_number, config, &mut iter)? {
                edit.add_file(0, meta);
            }
        }

        max_sequence = max_sequence.max(result.last_sequence);
        tracing::info!(
            log = number,
            recovered = result.entries_recovered,
            skipped = result.entries_skipped,
            truncated = result.was_truncated,
            "Replayed WAL"
        );
    }

    Ok(max_sequence)
}
