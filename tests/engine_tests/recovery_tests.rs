//! Tests for crash recovery
//!
//! A clean close leaves the memtable in the WAL, so every reopen here
//! goes through WAL replay.

use std::fs::{self, OpenOptions};
use std::io::Write;

use stratakv::{Engine, IteratorOptions, WriteBatch, WriteOptions};
use tempfile::TempDir;

use super::*;

fn write_keys(engine: &Engine, range: std::ops::Range<u32>) {
    for i in range {
        engine
            .put(format!("key{:04}", i).as_bytes(), format!("value{}", i).as_bytes())
            .unwrap();
    }
}

fn assert_keys(engine: &Engine, range: std::ops::Range<u32>) {
    for i in range {
        assert_eq!(
            engine.get(format!("key{:04}", i).as_bytes()).unwrap(),
            Some(format!("value{}", i).into_bytes()),
            "key{:04}",
            i
        );
    }
}

fn newest_log(dir: &std::path::Path) -> std::path::PathBuf {
    log_files(dir).pop().expect("no WAL file")
}

#[test]
fn test_reopen_keeps_data() {
    let temp = TempDir::new().unwrap();
    let config = builder(temp.path()).build();

    let engine = Engine::open(config.clone()).unwrap();
    write_keys(&engine, 0..100);
    engine.delete(b"key0050").unwrap();

    let engine = reopen(engine, config);
    assert_keys(&engine, 0..50);
    assert_keys(&engine, 51..100);
    assert_eq!(engine.get(b"key0050").unwrap(), None);
}

#[test]
fn test_repeated_reopen() {
    let temp = TempDir::new().unwrap();
    let config = builder(temp.path()).build();

    let mut engine = Engine::open(config.clone()).unwrap();
    for round in 0..5 {
        write_keys(&engine, round * 20..(round + 1) * 20);
        engine = reopen(engine, config.clone());
    }
    assert_keys(&engine, 0..100);
    assert_eq!(collect(&engine, IteratorOptions::default()).len(), 100);
}

#[test]
fn test_reopen_restores_sequence() {
    let temp = TempDir::new().unwrap();
    let config = builder(temp.path()).build();

    let engine = Engine::open(config.clone()).unwrap();
    write_keys(&engine, 0..10);
    let before = engine.snapshot().unwrap().sequence();

    let engine = reopen(engine, config);
    assert_eq!(engine.snapshot().unwrap().sequence(), before);

    // Newer writes still win over replayed ones
    engine.put(b"key0000", b"fresh").unwrap();
    assert_eq!(engine.get(b"key0000").unwrap(), Some(b"fresh".to_vec()));
}

#[test]
fn test_reopen_after_flushes() {
    let temp = TempDir::new().unwrap();
    let config = small_buffers(temp.path());

    let engine = Engine::open(config.clone()).unwrap();
    write_keys(&engine, 0..2000);

    let engine = reopen(engine, config);
    assert_keys(&engine, 0..2000);
}

#[test]
fn test_torn_wal_tail_is_dropped() {
    let temp = TempDir::new().unwrap();
    let config = builder(temp.path()).build();

    let engine = Engine::open(config.clone()).unwrap();
    write_keys(&engine, 0..20);
    engine.close().unwrap();
    drop(engine);

    // A partial frame header, as left by a crash mid-append
    let mut file = OpenOptions::new().append(true).open(newest_log(temp.path())).unwrap();
    file.write_all(&[0xAB, 0xCD, 0xEF]).unwrap();
    drop(file);

    let engine = Engine::open(config).unwrap();
    assert_keys(&engine, 0..20);
    engine.put(b"after", b"crash").unwrap();
    assert_eq!(engine.get(b"after").unwrap(), Some(b"crash".to_vec()));
}

#[test]
fn test_torn_wal_tail_rejected_when_paranoid() {
    let temp = TempDir::new().unwrap();

    let engine = Engine::open(builder(temp.path()).build()).unwrap();
    write_keys(&engine, 0..20);
    engine.close().unwrap();
    drop(engine);

    let log = newest_log(temp.path());
    let len = fs::metadata(&log).unwrap().len();
    // Cut the last frame in half
    OpenOptions::new().write(true).open(&log).unwrap().set_len(len - 4).unwrap();

    let result = Engine::open(builder(temp.path()).paranoid_checks(true).build());
    assert!(matches!(result, Err(e) if e.is_corruption()));

    // The lenient mode loses only the torn entry
    let engine = Engine::open(builder(temp.path()).build()).unwrap();
    assert_keys(&engine, 0..19);
    assert_eq!(engine.get(b"key0019").unwrap(), None);
}

#[test]
fn test_corruption_before_tail_fails_open() {
    let temp = TempDir::new().unwrap();

    let engine = Engine::open(builder(temp.path()).build()).unwrap();
    write_keys(&engine, 0..20);
    engine.close().unwrap();
    drop(engine);

    let log = newest_log(temp.path());
    let mut data = fs::read(&log).unwrap();
    // Inside the first frame's payload
    data[12] ^= 0xFF;
    fs::write(&log, data).unwrap();

    let result = Engine::open(builder(temp.path()).build());
    assert!(matches!(result, Err(e) if e.is_corruption()));
}

#[test]
fn test_bad_record_length_fails_open_without_losing_data() {
    let temp = TempDir::new().unwrap();

    let engine = Engine::open(builder(temp.path()).build()).unwrap();
    write_keys(&engine, 0..20);
    engine.close().unwrap();
    drop(engine);

    let log = newest_log(temp.path());
    let original = fs::read(&log).unwrap();
    let mut data = original.clone();
    // Length field of the first frame
    data[7] ^= 0xFF;
    fs::write(&log, &data).unwrap();

    let result = Engine::open(builder(temp.path()).build());
    assert!(matches!(result, Err(e) if e.is_corruption()));
    assert_eq!(fs::metadata(&log).unwrap().len(), original.len() as u64);

    // Undoing the damage brings every write back
    fs::write(&log, &original).unwrap();
    let engine = Engine::open(builder(temp.path()).build()).unwrap();
    assert_keys(&engine, 0..20);
}

#[test]
fn test_copy_of_open_database_recovers() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::open(small_buffers(temp.path())).unwrap();

    let sync = WriteOptions { sync: true };
    for i in 0..3000u32 {
        engine
            .put_with(
                format!("key{:04}", i).as_bytes(),
                format!("value{}", i).as_bytes(),
                sync,
            )
            .unwrap();
    }
    engine.compact_range(None, None).unwrap();
    for i in 3000..3100u32 {
        engine
            .put_with(
                format!("key{:04}", i).as_bytes(),
                format!("value{}", i).as_bytes(),
                sync,
            )
            .unwrap();
    }

    // Copy while the engine still holds its files, as a crash would leave them
    let copy = TempDir::new().unwrap();
    for entry in fs::read_dir(temp.path()).unwrap() {
        let entry = entry.unwrap();
        if entry.file_name() == "LOCK" {
            continue;
        }
        match fs::copy(entry.path(), copy.path().join(entry.file_name())) {
            Ok(_) => {}
            // Collected by the background worker after the listing
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => panic!("copy {:?}: {}", entry.path(), e),
        }
    }

    let recovered = Engine::open(small_buffers(copy.path())).unwrap();
    assert_keys(&recovered, 0..3100);
    assert_eq!(collect(&recovered, IteratorOptions::default()).len(), 3100);
    drop(engine);
}

#[test]
fn test_batch_is_atomic_across_reopen() {
    let temp = TempDir::new().unwrap();
    let config = builder(temp.path()).build();

    let engine = Engine::open(config.clone()).unwrap();
    engine.put(b"single", b"1").unwrap();
    let mut batch = WriteBatch::new();
    for i in 0..10 {
        batch.put(format!("batch{}", i), b"x");
    }
    engine.write(batch, WriteOptions { sync: true }).unwrap();
    engine.close().unwrap();
    drop(engine);

    // Tear the batch's frame
    let log = newest_log(temp.path());
    let len = fs::metadata(&log).unwrap().len();
    OpenOptions::new().write(true).open(&log).unwrap().set_len(len - 1).unwrap();

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.get(b"single").unwrap(), Some(b"1".to_vec()));
    for i in 0..10 {
        assert_eq!(engine.get(format!("batch{}", i).as_bytes()).unwrap(), None);
    }
}

#[test]
fn test_info_log_rotates_on_reopen() {
    let temp = TempDir::new().unwrap();
    let config = builder(temp.path()).build();

    let engine = Engine::open(config.clone()).unwrap();
    assert!(temp.path().join("LOG").exists());
    assert!(!temp.path().join("LOG.old").exists());

    let engine = reopen(engine, config);
    assert!(temp.path().join("LOG").exists());
    assert!(temp.path().join("LOG.old").exists());
    engine.close().unwrap();
}

#[test]
fn test_obsolete_logs_are_removed() {
    let temp = TempDir::new().unwrap();
    let config = builder(temp.path()).build();

    let mut engine = Engine::open(config.clone()).unwrap();
    for round in 0..3 {
        write_keys(&engine, round * 10..(round + 1) * 10);
        engine = reopen(engine, config.clone());
    }

    assert_eq!(log_files(temp.path()).len(), 1);
    assert_keys(&engine, 0..30);
}
