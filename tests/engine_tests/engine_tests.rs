//! Tests for Engine
//!
//! These tests verify:
//! - Basic get/put/delete operations
//! - Atomic batches and multi-key reads
//! - Open options and exclusive access
//! - Shared handles in multithreading mode
//! - Concurrent access patterns
//! - Engine lifecycle (open/close)

use std::sync::Arc;
use std::thread;

use stratakv::{Engine, IteratorOptions, ReadOptions, StrataError, WriteBatch, WriteOptions};
use tempfile::TempDir;

use super::*;

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let engine = Engine::open(builder(&data_dir).build()).unwrap();

    assert!(data_dir.join("CURRENT").exists());
    assert!(data_dir.join("LOCK").exists());
    assert!(data_dir.join("LOG").exists());
    assert_eq!(log_files(&data_dir).len(), 1);
    engine.close().unwrap();
}

#[test]
fn test_engine_put_get() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key1", b"value1").unwrap();

    assert_eq!(engine.get(b"key1").unwrap(), Some(b"value1".to_vec()));
}

#[test]
fn test_engine_get_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();
    assert_eq!(engine.get(b"missing").unwrap(), None);
}

#[test]
fn test_engine_put_overwrites() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"v1").unwrap();
    engine.put(b"key", b"v2").unwrap();

    assert_eq!(engine.get(b"key").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn test_engine_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"key", b"value").unwrap();
    engine.delete(b"key").unwrap();

    assert_eq!(engine.get(b"key").unwrap(), None);
    // Deleting an absent key is fine
    engine.delete(b"never-written").unwrap();
}

#[test]
fn test_put_put_delete_leaves_second_key() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"a", b"1").unwrap();
    engine.put(b"b", b"2").unwrap();
    engine.delete(b"a").unwrap();

    assert_eq!(engine.get(b"a").unwrap(), None);
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(keys(&collect(&engine, IteratorOptions::default())), vec!["b"]);
}

#[test]
fn test_empty_key_and_value() {
    let (_temp, engine) = setup_temp_engine();

    engine.put(b"", b"empty key").unwrap();
    engine.put(b"empty value", b"").unwrap();

    assert_eq!(engine.get(b"").unwrap(), Some(b"empty key".to_vec()));
    assert_eq!(engine.get(b"empty value").unwrap(), Some(Vec::new()));
}

#[test]
fn test_binary_keys_and_values() {
    let (_temp, engine) = setup_temp_engine();
    let key = [0u8, 255, 1, 254];
    let value: Vec<u8> = (0..=255).collect();

    engine.put(&key, &value).unwrap();
    assert_eq!(engine.get(&key).unwrap(), Some(value));
}

#[test]
fn test_large_value() {
    let (_temp, engine) = setup_temp_engine();
    let value = vec![7u8; 2 * 1024 * 1024];

    engine.put(b"big", &value).unwrap();
    engine.compact_range(None, None).unwrap();

    assert_eq!(engine.get(b"big").unwrap(), Some(value));
}

// =============================================================================
// Batch and Multi-key Tests
// =============================================================================

#[test]
fn test_write_batch_applies_all() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"old", b"x").unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"a".to_vec(), b"1".to_vec());
    batch.put(b"b".to_vec(), b"2".to_vec());
    batch.delete(b"old".to_vec());
    engine.write(batch, WriteOptions { sync: true }).unwrap();

    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(engine.get(b"old").unwrap(), None);
}

#[test]
fn test_write_batch_later_operation_wins() {
    let (_temp, engine) = setup_temp_engine();

    let mut batch = WriteBatch::new();
    batch.put(b"k".to_vec(), b"first".to_vec());
    batch.delete(b"k".to_vec());
    batch.put(b"k".to_vec(), b"last".to_vec());
    engine.write(batch, WriteOptions::default()).unwrap();

    assert_eq!(engine.get(b"k").unwrap(), Some(b"last".to_vec()));
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let (_temp, engine) = setup_temp_engine();
    let before = engine.snapshot().unwrap().sequence();

    engine
        .write(WriteBatch::new(), WriteOptions { sync: true })
        .unwrap();

    assert_eq!(engine.snapshot().unwrap().sequence(), before);
}

#[test]
fn test_get_many_and_has_many() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"a", b"1").unwrap();
    engine.put(b"c", b"3").unwrap();

    let values = engine
        .get_many(&[&b"a"[..], b"b", b"c"], &ReadOptions::default())
        .unwrap();
    assert_eq!(values, vec![Some(b"1".to_vec()), None, Some(b"3".to_vec())]);

    let present = engine
        .has_many(&["a", "b", "c"], &ReadOptions::default())
        .unwrap();
    assert_eq!(present, vec![true, false, true]);

    assert!(engine.has(b"a", &ReadOptions::default()).unwrap());
    assert!(!engine.has(b"b", &ReadOptions::default()).unwrap());
}

#[test]
fn test_clear_range() {
    let (_temp, engine) = setup_temp_engine();
    for key in ["a", "b", "c", "d", "e"] {
        engine.put(key.as_bytes(), b"v").unwrap();
    }

    let deleted = engine.clear(IteratorOptions::range("b", "d")).unwrap();

    assert_eq!(deleted, 2);
    assert_eq!(
        keys(&collect(&engine, IteratorOptions::default())),
        vec!["a", "d", "e"]
    );

    assert_eq!(engine.clear(IteratorOptions::default()).unwrap(), 3);
    assert!(collect(&engine, IteratorOptions::default()).is_empty());
}

#[test]
fn test_clear_many_keys_in_several_batches() {
    let (_temp, engine) = setup_temp_engine();
    for i in 0..5000 {
        engine.put(format!("key{:06}", i).as_bytes(), b"v").unwrap();
    }

    assert_eq!(engine.clear(IteratorOptions::default()).unwrap(), 5000);
    assert_eq!(engine.get(b"key000000").unwrap(), None);
    assert_eq!(engine.get(b"key004999").unwrap(), None);
}

// =============================================================================
// Open Options and Locking
// =============================================================================

#[test]
fn test_open_missing_without_create_fails() {
    let temp_dir = TempDir::new().unwrap();
    let location = temp_dir.path().join("absent");

    let result = Engine::open(builder(&location).create_if_missing(false).build());

    assert!(matches!(result, Err(StrataError::InvalidArgument(_))));
    assert!(!location.exists());
}

#[test]
fn test_open_existing_with_error_if_exists_fails() {
    let (temp_dir, engine) = setup_temp_engine();
    engine.close().unwrap();

    let result = Engine::open(builder(temp_dir.path()).error_if_exists(true).build());
    assert!(matches!(result, Err(StrataError::InvalidArgument(_))));
}

#[test]
fn test_second_open_is_locked() {
    let (temp_dir, engine) = setup_temp_engine();

    let result = Engine::open(builder(temp_dir.path()).build());
    assert!(matches!(result, Err(StrataError::Locked(_))));

    // A shared open cannot join an exclusive one either
    let result = Engine::open(builder(temp_dir.path()).multithreading(true).build());
    assert!(matches!(result, Err(StrataError::Locked(_))));

    engine.close().unwrap();
    let again = Engine::open(builder(temp_dir.path()).build()).unwrap();
    again.close().unwrap();
}

#[test]
fn test_multithreading_shares_one_engine() {
    let temp_dir = TempDir::new().unwrap();
    let config = builder(temp_dir.path()).multithreading(true).build();

    let first = Engine::open(config.clone()).unwrap();
    let second = Engine::open(config.clone()).unwrap();

    first.put(b"shared", b"yes").unwrap();
    assert_eq!(second.get(b"shared").unwrap(), Some(b"yes".to_vec()));

    // The engine stays up until the last handle closes
    first.close().unwrap();
    assert!(matches!(first.get(b"shared"), Err(StrataError::NotOpen)));
    assert_eq!(second.get(b"shared").unwrap(), Some(b"yes".to_vec()));

    second.close().unwrap();
    let reopened = Engine::open(builder(temp_dir.path()).build()).unwrap();
    assert_eq!(reopened.get(b"shared").unwrap(), Some(b"yes".to_vec()));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_operations_after_close_fail() {
    let (_temp, engine) = setup_temp_engine();
    engine.put(b"k", b"v").unwrap();
    engine.close().unwrap();

    assert!(matches!(engine.get(b"k"), Err(StrataError::NotOpen)));
    assert!(matches!(engine.put(b"k", b"v"), Err(StrataError::NotOpen)));
    assert!(matches!(
        engine.iter(IteratorOptions::default()),
        Err(StrataError::NotOpen)
    ));
    assert!(matches!(engine.snapshot(), Err(StrataError::NotOpen)));
    assert!(matches!(
        engine.get_property("leveldb.stats"),
        Err(StrataError::NotOpen)
    ));

    // Closing twice is harmless
    engine.close().unwrap();
}

#[test]
fn test_drop_closes_engine() {
    let temp_dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(builder(temp_dir.path()).build()).unwrap();
        engine.put(b"k", b"v").unwrap();
    }

    let engine = Engine::open(builder(temp_dir.path()).build()).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v".to_vec()));
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_writers_and_readers() {
    let (_temp, engine) = setup_temp_engine_with_small_buffers();
    let engine = Arc::new(engine);

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("t{}-{:04}", t, i);
                    engine.put(key.as_bytes(), key.as_bytes()).unwrap();
                }
            })
        })
        .collect();

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..20 {
                    // Every visible key carries its own name as value
                    for (key, value) in collect(&engine, IteratorOptions::default()) {
                        assert_eq!(key, value);
                    }
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    for t in 0..4 {
        for i in 0..500 {
            let key = format!("t{}-{:04}", t, i);
            assert_eq!(engine.get(key.as_bytes()).unwrap(), Some(key.into_bytes()));
        }
    }
}
