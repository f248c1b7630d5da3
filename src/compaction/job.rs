//! Compaction job
//!
//! Merges the input tables of a `Compaction` into new tables for the output
//! level, dropping entries no reader can observe any more.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::{Compaction, CompactionStats};
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::filename::table_file_name;
use crate::iterator::{BoxedIterator, InternalIterator, MergingIterator};
use crate::key::{parse_internal_key, SequenceNumber, ValueKind, MAX_SEQUENCE_NUMBER};
use crate::table::{TableBuilder, TableCache};
use crate::version::{FileMetaData, LevelIterator};

/// Tables written by a successful compaction
#[derive(Debug, Default)]
pub struct CompactionOutput {
    pub files: Vec<FileMetaData>,
    pub stats: CompactionStats,
}

/// Write every entry of `iter` into table `number` under `dir`
///
/// Returns `None` (and leaves no file behind) when `iter` is empty. Used by
/// memtable flushes and by repair.
pub fn build_table(
    dir: &Path,
    number: u64,
    config: &Config,
    iter: &mut dyn InternalIterator,
) -> Result<Option<FileMetaData>> {
    let path = dir.join(table_file_name(number));
    let mut builder = TableBuilder::new(&path, config)?;

    let result = (|| -> Result<()> {
        iter.seek_to_first()?;
        while iter.valid() {
            builder.add(iter.key(), iter.value())?;
            iter.next()?;
        }
        Ok(())
    })();

    if let Err(e) = result {
        builder.abandon()?;
        return Err(e);
    }
    if builder.is_empty() {
        builder.abandon()?;
        return Ok(None);
    }

    match builder.finish() {
        Ok(summary) => Ok(Some(FileMetaData {
            number,
            file_size: summary.file_size,
            smallest: summary.smallest,
            largest: summary.largest,
        })),
        Err(e) => {
            let _ = fs::remove_file(&path);
            Err(e)
        }
    }
}

/// Merge the inputs of `compaction` into new output tables
///
/// Entries are dropped when a newer version of the same key is already
/// visible to the oldest snapshot, and tombstones are dropped when no deeper
/// level can hold the key. On failure every table written so far is
/// removed.
pub fn run_compaction(
    compaction: &Compaction,
    dir: &Path,
    config: &Config,
    table_cache: &Arc<TableCache>,
    smallest_snapshot: SequenceNumber,
    mut new_file_number: impl FnMut() -> u64,
) -> Result<CompactionOutput> {
    let started = Instant::now();
    let mut output = CompactionOutput::default();

    tracing::info!(
        level = compaction.level(),
        files = compaction.num_input_files(),
        bytes = compaction.input_bytes(),
        manual = compaction.is_manual(),
        "Compacting"
    );

    let result = merge_inputs(
        compaction,
        dir,
        config,
        table_cache,
        smallest_snapshot,
        &mut new_file_number,
        &mut output.files,
    );

    if let Err(e) = result {
        for file in &output.files {
            let _ = fs::remove_file(dir.join(table_file_name(file.number)));
        }
        return Err(e);
    }

    output.stats = CompactionStats {
        duration: started.elapsed(),
        bytes_read: compaction.input_bytes(),
        bytes_written: output.files.iter().map(|f| f.file_size).sum(),
        count: 1,
    };
    Ok(output)
}

fn input_iterator(
    compaction: &Compaction,
    table_cache: &Arc<TableCache>,
) -> Result<MergingIterator> {
    let mut children: Vec<BoxedIterator> = Vec::new();

    for (which, files) in [compaction.inputs(0), compaction.inputs(1)].iter().enumerate() {
        if files.is_empty() {
            continue;
        }
        if compaction.level() + which == 0 {
            // Level-0 files may overlap: each gets its own cursor, newest first
            for file in files.iter().rev() {
                let table = table_cache.get(file.number, file.file_size)?;
                children.push(Box::new(table.iter(false)));
            }
        } else {
            children.push(Box::new(LevelIterator::new(
                files.to_vec(),
                Arc::clone(table_cache),
                false,
            )));
        }
    }

    Ok(MergingIterator::new(children))
}

fn merge_inputs(
    compaction: &Compaction,
    dir: &Path,
    config: &Config,
    table_cache: &Arc<TableCache>,
    smallest_snapshot: SequenceNumber,
    new_file_number: &mut impl FnMut() -> u64,
    outputs: &mut Vec<FileMetaData>,
) -> Result<()> {
    let mut input = input_iterator(compaction, table_cache)?;
    let mut builder: Option<(u64, TableBuilder)> = None;

    let mut current_user_key: Option<Vec<u8>> = None;
    let mut last_sequence_for_key = MAX_SEQUENCE_NUMBER;
    let mut cut_pending = false;

    let result = (|| -> Result<()> {
        input.seek_to_first()?;
        while input.valid() {
            let key = input.key();
            let parsed = parse_internal_key(key).ok_or_else(|| {
                StrataError::corruption("bad internal key in compaction input")
            })?;

            let first_of_key = current_user_key.as_deref() != Some(parsed.user_key);
            if first_of_key {
                current_user_key = Some(parsed.user_key.to_vec());
                last_sequence_for_key = MAX_SEQUENCE_NUMBER;

                // Never split one user key across two output files
                if cut_pending {
                    if let Some((number, table)) = builder.take() {
                        outputs.push(finish_output(number, table)?);
                    }
                    cut_pending = false;
                }
            }

            let drop = if last_sequence_for_key <= smallest_snapshot {
                // Shadowed by a newer entry every snapshot already sees
                true
            } else {
                parsed.kind == ValueKind::Deletion
                    && parsed.sequence <= smallest_snapshot
                    && compaction.is_base_level_for_key(parsed.user_key)
            };
            last_sequence_for_key = parsed.sequence;

            if !drop {
                if builder.is_none() {
                    let number = new_file_number();
                    let path = dir.join(table_file_name(number));
                    builder = Some((number, TableBuilder::new(&path, config)?));
                }
                if let Some((_, table)) = builder.as_mut() {
                    table.add(key, input.value())?;
                    if table.file_size() >= compaction.max_output_file_size() {
                        cut_pending = true;
                    }
                }
            }

            input.next()?;
        }

        if let Some((number, table)) = builder.take() {
            outputs.push(finish_output(number, table)?);
        }
        Ok(())
    })();

    if result.is_err() {
        if let Some((_, table)) = builder.take() {
            let _ = table.abandon();
        }
    }
    result
}

fn finish_output(number: u64, builder: TableBuilder) -> Result<FileMetaData> {
    let summary = builder.finish()?;
    tracing::debug!(
        number,
        bytes = summary.file_size,
        entries = summary.entry_count,
        "Wrote compaction output"
    );
    Ok(FileMetaData {
        number,
        file_size: summary.file_size,
        smallest: summary.smallest,
        largest: summary.largest,
    })
}
