//! Write path

use std::mem;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::MutexGuard;

use super::{EngineInner, ImmutableMemTable, SuperVersion, WriteState};
use crate::batch::WriteBatch;
use crate::compaction::Task;
use crate::config::{IteratorOptions, WriteOptions};
use crate::error::{Result, StrataError};
use crate::filename::log_file_name;
use crate::memtable::MemTable;
use crate::wal::{WalEntry, WalWriter};

/// Keys gathered per delete batch by `clear`
const CLEAR_BATCH_BYTES: usize = 16 * 1024;

/// How long a stalled writer sleeps before re-checking
const STALL_WAIT: Duration = Duration::from_millis(100);

impl EngineInner {
    /// Apply a batch
    ///
    /// Steps:
    /// 1. Acquire the write mutex
    /// 2. Make room in the memtable (may stall on background work)
    /// 3. Append one WAL record covering the whole batch
    /// 4. Insert into the memtable and publish the last sequence
    pub(super) fn write(&self, batch: WriteBatch, options: WriteOptions) -> Result<()> {
        let mut state = self.writer.lock();
        self.check_open()?;
        self.check_background_error()?;

        if batch.is_empty() {
            if options.sync {
                state.wal.sync()?;
            }
            return Ok(());
        }

        self.make_room_for_write(&mut state, false)?;

        let sequence = self.last_sequence.load(Ordering::Acquire) + 1;
        let entry = WalEntry::new(sequence, batch.into_operations());

        if let Err(e) = state.wal.append(&entry, options.sync) {
            // The log may now hold a partial record: refuse further writes
            self.set_background_error(&e);
            return Err(e);
        }

        let mem = Arc::clone(&self.super_version.read().mem);
        mem.apply(&entry);
        self.last_sequence
            .store(entry.last_sequence(), Ordering::Release);
        Ok(())
    }

    /// Delete every key selected by `options` in batches of at most
    /// `CLEAR_BATCH_BYTES` of keys
    pub(super) fn clear(&self, options: IteratorOptions<'_>) -> Result<u64> {
        let options = IteratorOptions {
            fill_cache: false,
            ..options
        };
        let mut iter = self.iter(&options)?;

        let mut batch = WriteBatch::new();
        let mut bytes = 0;
        let mut deleted = 0;

        while let Some((key, _)) = iter.next_entry()? {
            bytes += key.len();
            batch.delete(key);
            deleted += 1;

            if bytes >= CLEAR_BATCH_BYTES {
                self.write(mem::take(&mut batch), WriteOptions::default())?;
                bytes = 0;
            }
        }
        if !batch.is_empty() {
            self.write(batch, WriteOptions::default())?;
        }

        iter.close();
        tracing::debug!(deleted, "Cleared range");
        Ok(deleted)
    }

    /// Ensure the active memtable can take another batch
    ///
    /// With `force`, a non-empty memtable is frozen regardless of its size.
    pub(super) fn make_room_for_write(
        &self,
        state: &mut MutexGuard<'_, WriteState>,
        mut force: bool,
    ) -> Result<()> {
        let mut allow_delay = !force;

        loop {
            self.check_open()?;
            self.check_background_error()?;

            let sv = self.current_super_version();
            let level0_files = sv.version.num_files(0);

            if allow_delay && level0_files >= self.config.level0_slowdown_writes_trigger {
                // Hand some time to the compaction instead of stalling later
                thread::sleep(Duration::from_millis(1));
                allow_delay = false;
                continue;
            }

            if !force && sv.mem.size() < self.config.write_buffer_size {
                return Ok(());
            }
            if force && sv.mem.is_empty() {
                return Ok(());
            }

            if sv.imms.len() >= self.config.max_immutable_memtables {
                tracing::debug!(pending = sv.imms.len(), "Waiting for memtable flush");
                self.wait_for_progress();
                continue;
            }

            if level0_files >= self.config.level0_stop_writes_trigger {
                tracing::debug!(level0_files, "Waiting for level-0 compaction");
                self.schedule(Task::Compact);
                self.wait_for_progress();
                continue;
            }

            self.switch_memtable(state, &sv)?;
            force = false;
        }
    }

    /// Freeze the active memtable behind a new WAL and schedule its flush
    fn switch_memtable(
        &self,
        state: &mut MutexGuard<'_, WriteState>,
        current: &SuperVersion,
    ) -> Result<()> {
        let log_number = self.versions.lock().new_file_number();
        let wal = WalWriter::open(&self.dir.join(log_file_name(log_number)))?;

        let old = mem::replace(&mut state.wal, wal);
        state.log_number = log_number;
        drop(old);

        let frozen = Arc::new(ImmutableMemTable {
            table: Arc::clone(&current.mem),
            next_log_number: log_number,
            last_sequence: self.last_sequence.load(Ordering::Acquire),
        });

        {
            let mut sv = self.super_version.write();
            let mut next = SuperVersion::clone(&sv);
            next.mem = Arc::new(MemTable::new());
            next.imms.push(frozen);
            *sv = Arc::new(next);
        }

        tracing::debug!(log_number, bytes = current.mem.size(), "Froze memtable");
        self.schedule(Task::Flush);
        Ok(())
    }

    fn wait_for_progress(&self) {
        let mut progress = self.progress.lock();
        self.progress_cv.wait_for(&mut progress, STALL_WAIT);
    }

    fn check_background_error(&self) -> Result<()> {
        match self.background_error.lock().as_ref() {
            Some(message) => Err(StrataError::Background(message.clone())),
            None => Ok(()),
        }
    }

    fn set_background_error(&self, error: &StrataError) {
        tracing::error!(error = %error, "Write failed; rejecting further writes");
        self.info_log
            .log(format_args!("Write path failure: {}", error));
        let mut slot = self.background_error.lock();
        if slot.is_none() {
            *slot = Some(error.to_string());
        }
    }
}
