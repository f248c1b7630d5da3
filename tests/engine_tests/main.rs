//! Engine integration tests

mod engine_tests;
mod maintenance_tests;
mod model_tests;
mod recovery_tests;

use std::path::{Path, PathBuf};

use stratakv::filename::{parse_file_name, FileType};
use stratakv::{Config, ConfigBuilder, Engine, IteratorOptions};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn builder(dir: &Path) -> ConfigBuilder {
    Config::builder().location(dir)
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(builder(temp_dir.path()).build()).unwrap();
    (temp_dir, engine)
}

/// Tiny memtables and tables so that flushes and compactions happen often
fn setup_temp_engine_with_small_buffers() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(small_buffers(temp_dir.path())).unwrap();
    (temp_dir, engine)
}

fn small_buffers(dir: &Path) -> Config {
    builder(dir)
        .write_buffer_size(4 * 1024)
        .max_file_size(16 * 1024)
        .block_size(512)
        .base_level_size(64 * 1024)
        .build()
}

fn reopen(engine: Engine, config: Config) -> Engine {
    engine.close().unwrap();
    drop(engine);
    Engine::open(config).unwrap()
}

fn collect(engine: &Engine, options: IteratorOptions<'_>) -> Vec<(Vec<u8>, Vec<u8>)> {
    engine
        .iter(options)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn keys(entries: &[(Vec<u8>, Vec<u8>)]) -> Vec<String> {
    entries
        .iter()
        .map(|(k, _)| String::from_utf8(k.clone()).unwrap())
        .collect()
}

fn files_of(dir: &Path, wanted: fn(FileType) -> bool) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| parse_file_name(&e.file_name().to_string_lossy()).is_some_and(wanted))
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

fn log_files(dir: &Path) -> Vec<PathBuf> {
    files_of(dir, |t| matches!(t, FileType::Log(_)))
}

fn table_files(dir: &Path) -> Vec<PathBuf> {
    files_of(dir, |t| matches!(t, FileType::Table(_)))
}

fn num_files_at_level(engine: &Engine, level: usize) -> usize {
    engine
        .get_property(&format!("leveldb.num-files-at-level{}", level))
        .unwrap()
        .unwrap()
        .parse()
        .unwrap()
}
