//! Flushes, compactions and obsolete-file cleanup
//!
//! Everything here except `request_compact_range` runs on the background
//! worker thread, which is the only thread installing versions once the
//! engine is open.

use std::fs;
use std::sync::Arc;
use std::time::Instant;

use super::{EngineInner, SuperVersion};
use crate::compaction::{
    build_table, pick_compaction, range_compaction, run_compaction, BackgroundWork, Compaction,
    CompactionStats, Task,
};
use crate::config::NUM_LEVELS;
use crate::error::{Result, StrataError};
use crate::filename::{parse_file_name, table_file_name, FileType};
use crate::memtable::MemTableIterator;
use crate::version::{Version, VersionEdit};

impl EngineInner {
    /// Ask the worker to compact `[begin, end]` and wait for it
    pub(super) fn request_compact_range(
        &self,
        begin: Option<&[u8]>,
        end: Option<&[u8]>,
    ) -> Result<()> {
        // Freeze the memtable so its contents take part
        {
            let mut state = self.writer.lock();
            self.check_open()?;
            self.make_room_for_write(&mut state, true)?;
        }

        let (reply, done) = crossbeam::channel::bounded(1);
        self.schedule(Task::ManualCompact {
            begin: begin.map(<[u8]>::to_vec),
            end: end.map(<[u8]>::to_vec),
            reply,
        });
        done.recv().map_err(|_| StrataError::NotOpen)?
    }

    /// Make `version` current for readers and wake stalled writers
    fn install_version(&self, version: Arc<Version>) {
        {
            let mut sv = self.super_version.write();
            let mut next = SuperVersion::clone(&sv);
            next.version = version;
            *sv = Arc::new(next);
        }
        self.signal_progress();
    }

    fn execute_compaction(&self, mut compaction: Compaction) -> Result<()> {
        let level = compaction.level();
        let num_inputs = compaction.num_input_files();

        if compaction.is_trivial_move() {
            let file = Arc::clone(&compaction.inputs(0)[0]);
            let mut edit = compaction.take_edit();
            edit.add_file(level + 1, (*file).clone());
            let version = self.versions.lock().log_and_apply(edit)?;
            self.install_version(version);

            self.info_log.log(format_args!(
                "Moved #{} to level-{} {} bytes",
                file.number,
                level + 1,
                file.file_size
            ));
            tracing::info!(number = file.number, from = level, to = level + 1, "Moved table");
            return Ok(());
        }

        // Versions below this are only reachable through open snapshots
        let smallest_snapshot = self.snapshots.smallest_visible(&self.last_sequence);

        let output = run_compaction(
            &compaction,
            &self.dir,
            &self.config,
            &self.table_cache,
            smallest_snapshot,
            || self.versions.lock().new_file_number(),
        )?;

        let mut edit = compaction.take_edit();
        // Releases the input version so its files can be collected below
        drop(compaction);
        for file in &output.files {
            edit.add_file(level + 1, file.clone());
        }

        let applied = self.versions.lock().log_and_apply(edit);
        let version = match applied {
            Ok(version) => version,
            Err(e) => {
                for file in &output.files {
                    let _ = fs::remove_file(self.dir.join(table_file_name(file.number)));
                }
                return Err(e);
            }
        };
        self.install_version(version);
        self.stats.lock()[level + 1].add(&output.stats);

        self.info_log.log(format_args!(
            "Compacted {} files at level-{} into {} files ({} bytes read, {} written)",
            num_inputs,
            level,
            output.files.len(),
            output.stats.bytes_read,
            output.stats.bytes_written
        ));
        tracing::info!(
            level,
            inputs = num_inputs,
            outputs = output.files.len(),
            bytes_read = output.stats.bytes_read,
            bytes_written = output.stats.bytes_written,
            elapsed = ?output.stats.duration,
            "Compaction finished"
        );

        self.delete_obsolete_files();
        Ok(())
    }

    /// Remove files no live version, WAL generation or manifest needs
    pub(super) fn delete_obsolete_files(&self) {
        let (live, log_number, prev_log_number, manifest_number) = {
            let mut versions = self.versions.lock();
            (
                versions.live_files(),
                versions.log_number(),
                versions.prev_log_number(),
                versions.manifest_file_number(),
            )
        };

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot list database directory");
                return;
            }
        };

        for entry in entries.filter_map(|entry| entry.ok()) {
            let name = entry.file_name();
            let keep = match parse_file_name(&name.to_string_lossy()) {
                Some(FileType::Log(number)) => number >= log_number || number == prev_log_number,
                Some(FileType::Table(number)) => live.contains(&number),
                Some(FileType::Manifest(number)) => number >= manifest_number,
                Some(FileType::Temp(_)) => false,
                _ => true,
            };
            if keep {
                continue;
            }

            if let Some(FileType::Table(number)) = parse_file_name(&name.to_string_lossy()) {
                self.table_cache.evict(number);
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => tracing::debug!(file = %name.to_string_lossy(), "Deleted obsolete file"),
                Err(e) => tracing::warn!(
                    file = %name.to_string_lossy(),
                    error = %e,
                    "Failed to delete obsolete file"
                ),
            }
        }
    }
}

impl BackgroundWork for EngineInner {
    fn flush_one(&self) -> Result<bool> {
        let Some(imm) = self.current_super_version().imms.first().cloned() else {
            return Ok(false);
        };

        let started = Instant::now();
        let number = self.versions.lock().new_file_number();
        let mut iter = MemTableIterator::new(Arc::clone(&imm.table));
        let meta = build_table(&self.dir, number, &self.config, &mut iter)?;

        let mut edit = VersionEdit::new();
        if let Some(meta) = &meta {
            edit.add_file(0, meta.clone());
        }
        edit.set_log_number(imm.next_log_number);
        edit.set_prev_log_number(0);
        edit.set_last_sequence(imm.last_sequence);

        let applied = self.versions.lock().log_and_apply(edit);
        let version = match applied {
            Ok(version) => version,
            Err(e) => {
                let _ = fs::remove_file(self.dir.join(table_file_name(number)));
                return Err(e);
            }
        };

        {
            let mut sv = self.super_version.write();
            let mut next = SuperVersion::clone(&sv);
            next.imms.retain(|pending| !Arc::ptr_eq(pending, &imm));
            next.version = version;
            *sv = Arc::new(next);
        }
        self.signal_progress();

        let bytes = meta.as_ref().map_or(0, |m| m.file_size);
        self.stats.lock()[0].add(&CompactionStats {
            duration: started.elapsed(),
            bytes_read: 0,
            bytes_written: bytes,
            count: 1,
        });
        self.info_log.log(format_args!(
            "Level-0 table #{}: {} bytes, {} entries",
            number,
            bytes,
            imm.table.entry_count()
        ));
        tracing::info!(
            number,
            bytes,
            entries = imm.table.entry_count(),
            elapsed = ?started.elapsed(),
            "Flushed memtable"
        );

        self.delete_obsolete_files();
        Ok(true)
    }

    fn compact_one(&self) -> Result<bool> {
        let compaction = pick_compaction(&self.versions.lock());
        match compaction {
            Some(compaction) => {
                self.execute_compaction(compaction)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        while self.flush_one()? {}

        // Compact down to the deepest level holding any of the range
        let max_level = {
            let version = &self.current_super_version().version;
            (1..NUM_LEVELS)
                .filter(|&level| version.files(level).iter().any(|f| f.overlaps(begin, end)))
                .max()
                .unwrap_or(1)
        };

        for level in 0..max_level {
            let compaction = range_compaction(&self.versions.lock(), level, begin, end);
            if let Some(compaction) = compaction {
                self.execute_compaction(compaction)?;
            }
        }

        tracing::info!(max_level, "Manual compaction finished");
        if self.versions.lock().needs_compaction() {
            self.schedule(Task::Compact);
        }
        Ok(())
    }

    fn collect_garbage(&self) {
        self.delete_obsolete_files();
    }

    fn background_failed(&self, error: &StrataError) {
        self.info_log
            .log(format_args!("Background job failed: {}", error));
    }
}
