//! Version Set
//!
//! Owns the current version, the manifest writer and the file number
//! counters. Callers serialize access through the engine's version mutex.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use super::edit::COMPARATOR_NAME;
use super::{Version, VersionEdit};
use crate::config::{Config, NUM_LEVELS};
use crate::error::{Result, StrataError};
use crate::filename::{manifest_file_name, read_current_file, set_current_file};
use crate::key::SequenceNumber;
use crate::table::TableCache;
use crate::wal::frame::{write_frame, Frame, FrameReader};

struct ManifestWriter {
    number: u64,
    writer: BufWriter<File>,
}

pub struct VersionSet {
    dir: PathBuf,
    config: Config,
    table_cache: Arc<TableCache>,

    current: Arc<Version>,

    /// Every version handed out; dead entries are pruned lazily
    live: Vec<Weak<Version>>,

    next_file_number: u64,
    manifest_file_number: u64,
    log_number: u64,
    prev_log_number: u64,

    /// Highest sequence number durable in table files
    last_sequence: SequenceNumber,

    /// Per level: the largest key of the last compaction's inputs
    compact_pointers: [Vec<u8>; NUM_LEVELS],

    manifest: Option<ManifestWriter>,
}

impl VersionSet {
    pub fn new(dir: &Path, config: &Config, table_cache: Arc<TableCache>) -> Self {
        let current = Arc::new(Version::new());
        Self {
            dir: dir.to_path_buf(),
            config: config.clone(),
            table_cache,
            live: vec![Arc::downgrade(&current)],
            current,
            next_file_number: 2,
            manifest_file_number: 1,
            log_number: 0,
            prev_log_number: 0,
            last_sequence: 0,
            compact_pointers: Default::default(),
            manifest: None,
        }
    }

    /// Write the manifest of a brand new database and point `CURRENT` at it
    pub fn create_new(dir: &Path) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.set_log_number(0);
        edit.set_next_file_number(2);
        edit.set_last_sequence(0);
        Self::write_manifest(dir, 1, &edit)
    }

    /// Write a one-edit manifest `number` and point `CURRENT` at it
    pub(crate) fn write_manifest(dir: &Path, number: u64, edit: &VersionEdit) -> Result<()> {
        let mut edit = edit.clone();
        edit.set_comparator(COMPARATOR_NAME);

        let path = dir.join(manifest_file_name(number));
        let result = (|| -> Result<()> {
            let mut file = File::create(&path)?;
            write_frame(&mut file, &edit.encode()?)?;
            file.sync_all()?;
            set_current_file(dir, number)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&path);
        }
        result
    }

    /// Rebuild the current version from the manifest named by `CURRENT`
    ///
    /// A torn final edit is dropped (it was never acknowledged) unless
    /// `paranoid_checks` is set.
    pub fn recover(&mut self) -> Result<()> {
        let path = read_current_file(&self.dir)?;
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let mut frames = FrameReader::new(BufReader::new(file), 0, len);

        let mut version = Version::new();
        let mut next_file = None;
        let mut log_number = None;
        let mut prev_log_number = None;
        let mut last_sequence = None;
        let mut edits = 0u64;

        loop {
            let payload = match frames.next_frame()? {
                Frame::Record(payload) => payload,
                Frame::End => break,
                Frame::TornTail { offset } => {
                    if self.config.paranoid_checks {
                        return Err(StrataError::corruption(format!(
                            "torn manifest record at offset {} in {}",
                            offset,
                            path.display()
                        )));
                    }
                    tracing::warn!(
                        path = %path.display(),
                        offset,
                        "Ignoring torn record at manifest tail"
                    );
                    break;
                }
                Frame::Corrupt { offset, reason } => {
                    return Err(StrataError::corruption(format!(
                        "{} at offset {} in {}",
                        reason,
                        offset,
                        path.display()
                    )))
                }
            };

            let edit = VersionEdit::decode(&payload).map_err(|e| {
                StrataError::corruption(format!("undecodable manifest edit: {}", e))
            })?;

            if let Some(name) = &edit.comparator {
                if name != COMPARATOR_NAME {
                    return Err(StrataError::InvalidArgument(format!(
                        "database uses comparator {}, expected {}",
                        name, COMPARATOR_NAME
                    )));
                }
            }

            version = version.apply(&edit, &self.config)?;
            for (level, key) in &edit.compact_pointers {
                if *level < NUM_LEVELS {
                    self.compact_pointers[*level] = key.clone();
                }
            }
            next_file = edit.next_file_number.or(next_file);
            log_number = edit.log_number.or(log_number);
            prev_log_number = edit.prev_log_number.or(prev_log_number);
            last_sequence = edit.last_sequence.or(last_sequence);
            edits += 1;
        }

        let (Some(next_file), Some(log_number), Some(last_sequence)) =
            (next_file, log_number, last_sequence)
        else {
            return Err(StrataError::corruption(format!(
                "manifest {} lacks file number, log number or sequence",
                path.display()
            )));
        };

        self.next_file_number = next_file;
        self.log_number = log_number;
        self.prev_log_number = prev_log_number.unwrap_or(0);
        self.last_sequence = last_sequence;
        self.mark_file_number_used(log_number);
        self.mark_file_number_used(self.prev_log_number);
        self.install(version);

        // Edits go to a fresh manifest that starts with a full snapshot
        self.manifest_file_number = self.new_file_number();

        tracing::info!(
            manifest = %path.display(),
            edits,
            files = self.current.total_files(),
            log_number,
            last_sequence,
            "Recovered version"
        );
        Ok(())
    }

    /// Persist `edit` to the manifest and install the resulting version
    ///
    /// The current version is untouched unless the edit is durable.
    pub fn log_and_apply(&mut self, mut edit: VersionEdit) -> Result<Arc<Version>> {
        match edit.log_number {
            Some(number) if number < self.log_number => {
                return Err(StrataError::InvalidArgument(format!(
                    "log number {} is older than {}",
                    number, self.log_number
                )))
            }
            Some(_) => {}
            None => edit.set_log_number(self.log_number),
        }
        if edit.prev_log_number.is_none() {
            edit.set_prev_log_number(self.prev_log_number);
        }
        if edit.last_sequence.is_none() {
            edit.set_last_sequence(self.last_sequence);
        }
        edit.set_next_file_number(self.next_file_number);

        let version = self.current.apply(&edit, &self.config)?;

        if let Err(e) = self.write_edit(&edit) {
            tracing::error!(error = %e, "Manifest write failed");
            return Err(e);
        }

        for (level, key) in &edit.compact_pointers {
            self.compact_pointers[*level] = key.clone();
        }
        self.log_number = edit.log_number.unwrap_or(self.log_number);
        self.prev_log_number = edit.prev_log_number.unwrap_or(self.prev_log_number);
        self.last_sequence = edit.last_sequence.unwrap_or(self.last_sequence);

        Ok(self.install(version))
    }

    fn write_edit(&mut self, edit: &VersionEdit) -> Result<()> {
        let created = self.manifest.is_none();
        if created {
            let number = self.manifest_file_number;
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(self.dir.join(manifest_file_name(number)))?;
            self.manifest = Some(ManifestWriter {
                number,
                writer: BufWriter::new(file),
            });
        }

        let snapshot = if created {
            Some(self.snapshot_edit().encode()?)
        } else {
            None
        };
        let payload = edit.encode()?;

        let result = match self.manifest.as_mut() {
            Some(manifest) => (|| -> Result<()> {
                if let Some(snapshot) = &snapshot {
                    write_frame(&mut manifest.writer, snapshot)?;
                }
                write_frame(&mut manifest.writer, &payload)?;
                manifest.writer.flush()?;
                manifest.writer.get_ref().sync_data()?;
                if created {
                    set_current_file(&self.dir, manifest.number)?;
                }
                Ok(())
            })(),
            None => Err(StrataError::NotOpen),
        };

        if result.is_err() {
            // Start over with a fresh manifest on the next edit
            if let Some(manifest) = self.manifest.take() {
                if created {
                    let _ = fs::remove_file(self.dir.join(manifest_file_name(manifest.number)));
                }
            }
            self.manifest_file_number = self.new_file_number();
        }
        result
    }

    /// Full description of the current state; the first record of a manifest
    fn snapshot_edit(&self) -> VersionEdit {
        let mut edit = VersionEdit::new();
        edit.set_comparator(COMPARATOR_NAME);
        for (level, key) in self.compact_pointers.iter().enumerate() {
            if !key.is_empty() {
                edit.set_compact_pointer(level, key.clone());
            }
        }
        for level in 0..NUM_LEVELS {
            for file in self.current.files(level) {
                edit.add_file(level, (**file).clone());
            }
        }
        edit
    }

    fn install(&mut self, version: Version) -> Arc<Version> {
        let version = Arc::new(version);
        self.live.retain(|v| v.strong_count() > 0);
        self.live.push(Arc::downgrade(&version));
        self.current = Arc::clone(&version);
        version
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn current(&self) -> Arc<Version> {
        Arc::clone(&self.current)
    }

    pub fn table_cache(&self) -> &Arc<TableCache> {
        &self.table_cache
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn new_file_number(&mut self) -> u64 {
        let number = self.next_file_number;
        self.next_file_number += 1;
        number
    }

    pub fn mark_file_number_used(&mut self, number: u64) {
        if self.next_file_number <= number {
            self.next_file_number = number + 1;
        }
    }

    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    pub fn manifest_file_number(&self) -> u64 {
        self.manifest_file_number
    }

    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    pub fn prev_log_number(&self) -> u64 {
        self.prev_log_number
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    pub fn compact_pointer(&self, level: usize) -> &[u8] {
        &self.compact_pointers[level]
    }

    pub fn needs_compaction(&self) -> bool {
        self.current.compaction_score() >= 1.0
    }

    /// Numbers of every table referenced by a version still in use
    pub fn live_files(&mut self) -> HashSet<u64> {
        self.live.retain(|v| v.strong_count() > 0);
        let mut live = HashSet::new();
        self.current.add_live_files(&mut live);
        for version in self.live.iter().filter_map(Weak::upgrade) {
            version.add_live_files(&mut live);
        }
        live
    }

    /// Number of versions still referenced by readers or the set itself
    pub fn live_version_count(&mut self) -> usize {
        self.live.retain(|v| v.strong_count() > 0);
        self.live.len()
    }
}
