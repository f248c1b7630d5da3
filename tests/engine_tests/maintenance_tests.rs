//! Tests for destroy and repair

use std::fs;

use stratakv::{destroy, repair, Engine, IteratorOptions, StrataError};
use tempfile::TempDir;

use super::*;

fn populated_location(temp: &TempDir, count: u32) -> std::path::PathBuf {
    let dir = temp.path().join("db");
    let engine = Engine::open(builder(&dir).build()).unwrap();
    for i in 0..count {
        engine
            .put(format!("key{:04}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }
    engine.close().unwrap();
    dir
}

// =============================================================================
// Destroy
// =============================================================================

#[test]
fn test_destroy_missing_location() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("never-created");

    destroy(&dir).unwrap();
    assert!(!dir.exists());
}

#[test]
fn test_destroy_removes_database() {
    let temp = TempDir::new().unwrap();
    let dir = populated_location(&temp, 10);

    destroy(&dir).unwrap();
    assert!(!dir.exists());

    // The location can be created afresh
    let engine = Engine::open(builder(&dir).build()).unwrap();
    assert_eq!(engine.get(b"key0001").unwrap(), None);
}

#[test]
fn test_destroy_keeps_foreign_files() {
    let temp = TempDir::new().unwrap();
    let dir = populated_location(&temp, 10);
    fs::write(dir.join("notes.txt"), b"keep me").unwrap();

    destroy(&dir).unwrap();

    assert!(dir.exists());
    let remaining: Vec<_> = fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(remaining, vec!["notes.txt"]);
}

#[test]
fn test_destroy_open_database_is_locked() {
    let (temp, engine) = setup_temp_engine();
    engine.put(b"key", b"value").unwrap();

    assert!(matches!(destroy(temp.path()), Err(StrataError::Locked(_))));
    assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));

    engine.close().unwrap();
    destroy(temp.path()).unwrap();
}

// =============================================================================
// Repair
// =============================================================================

#[test]
fn test_repair_missing_location() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("never-created");

    assert!(repair(&dir, &builder(&dir).build()).is_err());
    assert!(!dir.exists());
}

#[test]
fn test_repair_converts_logs() {
    let temp = TempDir::new().unwrap();
    let dir = populated_location(&temp, 50);
    let config = builder(&dir).build();

    let report = repair(&dir, &config).unwrap();
    assert!(report.logs_converted >= 1);
    assert!(report.tables >= 1);
    assert_eq!(report.last_sequence, 50);

    assert!(log_files(&dir).is_empty());
    assert!(!log_files(&dir.join("lost")).is_empty());

    let engine = Engine::open(config).unwrap();
    assert_eq!(collect(&engine, IteratorOptions::default()).len(), 50);
    assert_eq!(engine.get(b"key0042").unwrap(), Some(b"value42".to_vec()));

    // Sequence numbering continues past the recovered writes
    engine.put(b"key0042", b"newer").unwrap();
    assert_eq!(engine.get(b"key0042").unwrap(), Some(b"newer".to_vec()));
}

#[test]
fn test_repair_without_manifest() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("db");
    let config = builder(&dir).build();

    let engine = Engine::open(config.clone()).unwrap();
    for i in 0..200 {
        engine.put(format!("key{:04}", i).as_bytes(), b"table").unwrap();
    }
    engine.compact_range(None, None).unwrap();
    engine.put(b"key0000", b"log").unwrap();
    engine.close().unwrap();
    drop(engine);

    fs::remove_file(dir.join("CURRENT")).unwrap();
    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.file_name().unwrap().to_string_lossy().starts_with("MANIFEST-") {
            fs::remove_file(path).unwrap();
        }
    }

    repair(&dir, &config).unwrap();

    let engine = Engine::open(config).unwrap();
    assert_eq!(collect(&engine, IteratorOptions::default()).len(), 200);
    assert_eq!(engine.get(b"key0000").unwrap(), Some(b"log".to_vec()));
    assert_eq!(engine.get(b"key0199").unwrap(), Some(b"table".to_vec()));
}

#[test]
fn test_repair_sets_aside_damaged_table() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("db");
    let config = builder(&dir).build();

    let engine = Engine::open(config.clone()).unwrap();
    engine.put(b"lost", b"value").unwrap();
    engine.compact_range(None, None).unwrap();
    engine.close().unwrap();
    drop(engine);

    let tables = table_files(&dir);
    assert_eq!(tables.len(), 1);
    fs::write(&tables[0], b"not a table").unwrap();

    let report = repair(&dir, &config).unwrap();
    assert_eq!(report.tables, 0);
    assert!(table_files(&dir).is_empty());
    assert_eq!(table_files(&dir.join("lost")).len(), 1);

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"lost").unwrap(), None);
}

#[test]
fn test_repair_open_database_is_locked() {
    let (temp, engine) = setup_temp_engine();
    let config = builder(temp.path()).build();

    assert!(matches!(repair(temp.path(), &config), Err(StrataError::Locked(_))));
    engine.close().unwrap();
}
