//! Diagnostic properties

use std::fmt::Write;

use super::EngineInner;
use crate::config::NUM_LEVELS;
use crate::key::{display_key, parse_internal_key};

const NUM_FILES_PREFIX: &str = "leveldb.num-files-at-level";

impl EngineInner {
    /// Render property `name`, or `None` when it is unknown
    pub(super) fn property(&self, name: &str) -> Option<String> {
        if let Some(level) = name.strip_prefix(NUM_FILES_PREFIX) {
            let level: usize = level.parse().ok()?;
            if level >= NUM_LEVELS {
                return None;
            }
            let sv = self.current_super_version();
            return Some(sv.version.num_files(level).to_string());
        }

        match name {
            "leveldb.stats" => Some(self.stats_table()),
            "leveldb.sstables" => Some(self.sstables()),
            "leveldb.approximate-memory-usage" => Some(self.memory_usage().to_string()),
            _ => None,
        }
    }

    fn stats_table(&self) -> String {
        let version = self.current_super_version().version.clone();
        let stats = *self.stats.lock();
        let mb = |bytes: u64| bytes as f64 / 1048576.0;

        let mut out = String::new();
        out.push_str("                               Compactions\n");
        out.push_str("Level  Files Size(MB) Time(sec) Read(MB) Write(MB)\n");
        out.push_str("--------------------------------------------------\n");
        for (level, stat) in stats.iter().enumerate() {
            let files = version.num_files(level);
            if files == 0 && stat.count == 0 {
                continue;
            }
            let _ = writeln!(
                out,
                "{:>3} {:>8} {:>8.0} {:>9.0} {:>8.0} {:>9.0}",
                level,
                files,
                mb(version.level_bytes(level)),
                stat.duration.as_secs_f64(),
                mb(stat.bytes_read),
                mb(stat.bytes_written)
            );
        }
        out
    }

    fn sstables(&self) -> String {
        let version = self.current_super_version().version.clone();
        let mut out = String::new();
        for level in 0..NUM_LEVELS {
            let _ = writeln!(out, "--- level {} ---", level);
            for file in version.files(level) {
                let _ = writeln!(
                    out,
                    " {}:{}[{} .. {}]",
                    file.number,
                    file.file_size,
                    debug_internal_key(&file.smallest),
                    debug_internal_key(&file.largest)
                );
            }
        }
        out
    }

    /// Bytes held by memtables and cached blocks
    fn memory_usage(&self) -> usize {
        let sv = self.current_super_version();
        let memtables: usize = sv.mem.size() + sv.imms.iter().map(|imm| imm.table.size()).sum::<usize>();
        memtables + self.table_cache.block_cache().approximate_usage()
    }
}

/// `'key' @ sequence : kind`
fn debug_internal_key(key: &[u8]) -> String {
    match parse_internal_key(key) {
        Some(parsed) => format!(
            "'{}' @ {} : {}",
            display_key(parsed.user_key),
            parsed.sequence,
            parsed.kind as u8
        ),
        None => format!("(bad){}", display_key(key)),
    }
}
