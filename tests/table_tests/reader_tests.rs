//! Tests for Table reads
//!
//! These tests verify:
//! - Point lookups by lookup key, including tombstones
//! - Full scans in both directions across many blocks
//! - Approximate offsets grow with the key
//! - Damaged files are reported as corruption

use std::path::Path;
use std::sync::Arc;

use stratakv::iterator::InternalIterator;
use stratakv::key::{
    encode_internal_key, lookup_key, parse_internal_key, ValueKind, MAX_SEQUENCE_NUMBER,
};
use stratakv::table::{Table, TableBuilder};
use stratakv::Config;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn key(i: u64) -> String {
    format!("key{:05}", i)
}

/// Table with keys key00000..key{count}, value = "value{i}", sequence i + 1
fn build(dir: &Path, count: u64, config: &Config) -> Arc<Table> {
    let path = dir.join("000007.ldb");
    let mut builder = TableBuilder::new(&path, config).unwrap();
    for i in 0..count {
        builder
            .add(
                &encode_internal_key(key(i).as_bytes(), i + 1, ValueKind::Value),
                format!("value{}", i).as_bytes(),
            )
            .unwrap();
    }
    let summary = builder.finish().unwrap();
    Arc::new(Table::open(&path, 7, summary.file_size, None, false).unwrap())
}

fn small_blocks() -> Config {
    Config::builder().block_size(256).build()
}

// =============================================================================
// Point Lookups
// =============================================================================

#[test]
fn test_get_existing_keys() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 500, &small_blocks());

    for i in [0, 1, 250, 499] {
        let (found, value) = table
            .get(&lookup_key(key(i).as_bytes(), MAX_SEQUENCE_NUMBER), false)
            .unwrap()
            .unwrap();
        assert_eq!(parse_internal_key(&found).unwrap().user_key, key(i).as_bytes());
        assert_eq!(value, format!("value{}", i).into_bytes());
    }
}

#[test]
fn test_get_nonexistent_key() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 100, &small_blocks());

    assert!(table.get(&lookup_key(b"key00100", 1000), false).unwrap().is_none());
    assert!(table.get(&lookup_key(b"aaa", 1000), false).unwrap().is_none());
    assert!(table.get(&lookup_key(b"zzz", 1000), false).unwrap().is_none());
}

#[test]
fn test_get_respects_sequence() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 10, &Config::default());

    // key00005 was written at sequence 6
    assert!(table.get(&lookup_key(b"key00005", 5), false).unwrap().is_none());
    assert!(table.get(&lookup_key(b"key00005", 6), false).unwrap().is_some());
}

#[test]
fn test_get_tombstone() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("000001.ldb");
    let mut builder = TableBuilder::new(&path, &Config::default()).unwrap();
    builder
        .add(&encode_internal_key(b"gone", 9, ValueKind::Deletion), b"")
        .unwrap();
    builder
        .add(&encode_internal_key(b"gone", 3, ValueKind::Value), b"old")
        .unwrap();
    let size = builder.finish().unwrap().file_size;
    let table = Table::open(&path, 1, size, None, false).unwrap();

    let (found, _) = table.get(&lookup_key(b"gone", 100), false).unwrap().unwrap();
    assert_eq!(parse_internal_key(&found).unwrap().kind, ValueKind::Deletion);

    let (found, value) = table.get(&lookup_key(b"gone", 5), false).unwrap().unwrap();
    assert_eq!(parse_internal_key(&found).unwrap().kind, ValueKind::Value);
    assert_eq!(value, b"old");
}

#[test]
fn test_filter_admits_every_key() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 1000, &Config::default());

    for i in 0..1000 {
        assert!(table.may_contain(key(i).as_bytes()));
    }
    let false_positives = (1000..11000)
        .filter(|&i| table.may_contain(key(i).as_bytes()))
        .count();
    // 10 bits per key gives roughly 1%
    assert!(false_positives < 500, "{} false positives", false_positives);
}

// =============================================================================
// Iteration
// =============================================================================

#[test]
fn test_iterator_forward_and_backward() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 300, &small_blocks());

    let mut iter = table.iter(false);
    iter.seek_to_first().unwrap();
    let mut forward = Vec::new();
    while iter.valid() {
        forward.push(parse_internal_key(iter.key()).unwrap().user_key.to_vec());
        iter.next().unwrap();
    }
    assert_eq!(forward.len(), 300);
    assert!(forward.windows(2).all(|w| w[0] < w[1]));

    iter.seek_to_last().unwrap();
    let mut backward = Vec::new();
    while iter.valid() {
        backward.push(parse_internal_key(iter.key()).unwrap().user_key.to_vec());
        iter.prev().unwrap();
    }
    backward.reverse();
    assert_eq!(forward, backward);
}

#[test]
fn test_iterator_seek() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 300, &small_blocks());

    let mut iter = table.iter(false);
    iter.seek(&lookup_key(b"key00150x", MAX_SEQUENCE_NUMBER)).unwrap();
    assert_eq!(parse_internal_key(iter.key()).unwrap().user_key, b"key00151");

    iter.seek_for_prev(&lookup_key(b"key00150x", MAX_SEQUENCE_NUMBER)).unwrap();
    assert_eq!(parse_internal_key(iter.key()).unwrap().user_key, b"key00150");
}

#[test]
fn test_approximate_offsets_increase() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 2000, &small_blocks());

    let start = table.approximate_offset_of(&lookup_key(b"", MAX_SEQUENCE_NUMBER)).unwrap();
    let middle = table
        .approximate_offset_of(&lookup_key(b"key01000", MAX_SEQUENCE_NUMBER))
        .unwrap();
    let end = table.approximate_offset_of(&lookup_key(b"zzz", MAX_SEQUENCE_NUMBER)).unwrap();

    assert_eq!(start, 0);
    assert!(start < middle && middle < end);
    assert!(end <= table.file_size());
}

// =============================================================================
// Damage
// =============================================================================

#[test]
fn test_open_nonexistent_file() {
    let temp = TempDir::new().unwrap();
    let result = Table::open(&temp.path().join("000009.ldb"), 9, 0, None, false);
    assert!(result.is_err());
}

#[test]
fn test_open_invalid_magic() {
    let temp = TempDir::new().unwrap();
    let table = build(temp.path(), 10, &Config::default());
    let path = temp.path().join("000007.ldb");
    let size = table.file_size();
    drop(table);

    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let result = Table::open(&path, 7, size, None, false);
    assert!(matches!(result, Err(e) if e.is_corruption()));
}

#[test]
fn test_corrupt_data_block_detected() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder().compression(false).build();
    let table = build(temp.path(), 10, &config);
    let path = temp.path().join("000007.ldb");
    let size = table.file_size();
    drop(table);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[3] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let table = Arc::new(Table::open(&path, 7, size, None, false).unwrap());
    let err = table
        .get(&lookup_key(b"key00000", 100), false)
        .unwrap_err();
    assert!(err.is_corruption());

    let mut iter = table.iter(false);
    assert!(iter.seek_to_first().unwrap_err().is_corruption());
}
