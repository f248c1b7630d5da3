//! Offline maintenance: destroy and repair
//!
//! Both take the lock file, so they fail with `Locked` while the location
//! is open anywhere.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use super::{registry, LockFile};
use crate::compaction::build_table;
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::filename::{
    log_file_name, manifest_file_name, parse_file_name, table_file_name, FileType, LOCK, LOST_DIR,
};
use crate::iterator::InternalIterator;
use crate::key::{parse_internal_key, SequenceNumber};
use crate::memtable::{MemTable, MemTableIterator};
use crate::table::{BlockCache, TableCache};
use crate::version::{FileMetaData, VersionEdit, VersionSet};
use crate::wal::WalRecovery;

/// Delete every database file at `location`, then the directory itself if
/// nothing else is left in it
///
/// A missing directory is not an error, and files this engine did not
/// create are left alone.
pub fn destroy(location: &Path) -> Result<()> {
    let entries = match fs::read_dir(location) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();

    if registry::is_open(location) {
        return Err(StrataError::Locked(location.display().to_string()));
    }
    let lock = LockFile::acquire(location)?;

    let mut result = Ok(());
    for name in &names {
        match parse_file_name(name) {
            Some(FileType::Lock) | None => continue,
            Some(_) => {
                if let Err(e) = fs::remove_file(location.join(name)) {
                    tracing::warn!(file = %name, error = %e, "Failed to delete database file");
                    result = Err(e.into());
                }
            }
        }
    }

    drop(lock);
    let _ = fs::remove_file(location.join(LOCK));
    // Fails harmlessly when foreign files remain
    let _ = fs::remove_dir(location);

    tracing::info!(location = %location.display(), "Destroyed database");
    result
}

/// What `repair` recovered
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairReport {
    /// Tables registered in the rebuilt manifest
    pub tables: usize,
    /// WAL files converted into tables
    pub logs_converted: usize,
    /// Files moved to `lost/`
    pub files_archived: usize,
    pub last_sequence: SequenceNumber,
}

/// Rebuild the manifest of a damaged database from its files
///
/// Every WAL is converted into a table, every readable table is registered
/// at level 0, and unreadable files are moved to `lost/`. Data in damaged
/// tables may be lost; everything readable stays visible.
pub fn repair(location: &Path, config: &Config) -> Result<RepairReport> {
    // Surfaces a missing directory as an I/O error
    let entries = fs::read_dir(location)?;
    if registry::is_open(location) {
        return Err(StrataError::Locked(location.display().to_string()));
    }
    let _lock = LockFile::acquire(location)?;

    let mut logs = Vec::new();
    let mut tables = Vec::new();
    let mut manifests = Vec::new();
    let mut max_number = 1;
    for entry in entries.filter_map(|entry| entry.ok()) {
        let number = match parse_file_name(&entry.file_name().to_string_lossy()) {
            Some(FileType::Log(n)) => {
                logs.push(n);
                n
            }
            Some(FileType::Table(n)) => {
                tables.push(n);
                n
            }
            Some(FileType::Manifest(n)) => {
                manifests.push(n);
                n
            }
            _ => continue,
        };
        max_number = max_number.max(number);
    }
    logs.sort_unstable();
    tables.sort_unstable();

    let mut report = RepairReport::default();
    let mut next_number = max_number + 1;

    // Step 1: Turn each WAL into a table, keeping whatever replays cleanly
    for log in logs {
        let path = location.join(log_file_name(log));
        let mem = Arc::new(MemTable::new());
        if let Err(e) = WalRecovery::replay(&path, 0, false, |entry| {
            mem.apply(&entry);
            Ok(())
        }) {
            tracing::warn!(log, error = %e, "Stopped replaying damaged WAL");
        }

        if !mem.is_empty() {
            let number = next_number;
            next_number += 1;
            let mut iter = MemTableIterator::new(Arc::clone(&mem));
            if build_table(location, number, config, &mut iter)?.is_some() {
                tables.push(number);
            }
        }
        archive(location, &log_file_name(log))?;
        report.logs_converted += 1;
        report.files_archived += 1;
    }

    // Step 2: Scan each table for its key range and highest sequence
    let cache = TableCache::new(
        location,
        config.max_open_files,
        Arc::new(BlockCache::new(0, config.block_size)),
        true,
    );
    let mut edit = VersionEdit::new();
    for number in tables {
        let name = table_file_name(number);
        match scan_table(location, &cache, number) {
            Ok(Some((meta, max_sequence))) => {
                report.last_sequence = report.last_sequence.max(max_sequence);
                edit.add_file(0, meta);
                report.tables += 1;
            }
            Ok(None) => {
                archive(location, &name)?;
                report.files_archived += 1;
            }
            Err(e) => {
                tracing::warn!(table = number, error = %e, "Setting aside unreadable table");
                archive(location, &name)?;
                report.files_archived += 1;
            }
        }
        cache.evict(number);
    }

    // Step 3: Write a fresh manifest describing exactly those tables
    let manifest_number = next_number;
    edit.set_log_number(0);
    edit.set_next_file_number(manifest_number + 1);
    edit.set_last_sequence(report.last_sequence);
    VersionSet::write_manifest(location, manifest_number, &edit)?;

    for number in manifests {
        archive(location, &manifest_file_name(number))?;
        report.files_archived += 1;
    }

    tracing::info!(
        location = %location.display(),
        tables = report.tables,
        logs = report.logs_converted,
        archived = report.files_archived,
        last_sequence = report.last_sequence,
        "Repaired database"
    );
    Ok(report)
}

/// Key range and highest sequence of a table, or `None` if it is empty
fn scan_table(
    dir: &Path,
    cache: &TableCache,
    number: u64,
) -> Result<Option<(FileMetaData, SequenceNumber)>> {
    let file_size = fs::metadata(dir.join(table_file_name(number)))?.len();
    let table = cache.get(number, file_size)?;
    let mut iter = table.iter(false);

    let mut smallest = None;
    let mut largest = Vec::new();
    let mut max_sequence = 0;

    iter.seek_to_first()?;
    while iter.valid() {
        let parsed = parse_internal_key(iter.key())
            .ok_or_else(|| StrataError::corruption(format!("bad key in table {}", number)))?;
        max_sequence = max_sequence.max(parsed.sequence);
        if smallest.is_none() {
            smallest = Some(iter.key().to_vec());
        }
        largest.clear();
        largest.extend_from_slice(iter.key());
        iter.next()?;
    }

    Ok(smallest.map(|smallest| {
        (
            FileMetaData {
                number,
                file_size,
                smallest,
                largest,
            },
            max_sequence,
        )
    }))
}

/// Move a file into `lost/`
fn archive(dir: &Path, name: &str) -> Result<()> {
    let lost = dir.join(LOST_DIR);
    fs::create_dir_all(&lost)?;
    fs::rename(dir.join(name), lost.join(name))?;
    tracing::debug!(file = name, "Archived file");
    Ok(())
}
