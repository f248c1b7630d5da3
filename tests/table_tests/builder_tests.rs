//! Tests for TableBuilder
//!
//! These tests verify:
//! - Building a table file from sorted internal entries
//! - The summary reports key range, entry count and size
//! - Abandoning removes the partial file

use std::path::PathBuf;

use stratakv::key::{encode_internal_key, ValueKind};
use stratakv::table::TableBuilder;
use stratakv::{CompressionType, Config};
use tempfile::TempDir;

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("000005.ldb");
    (temp_dir, path)
}

fn ikey(user_key: &str, sequence: u64) -> Vec<u8> {
    encode_internal_key(user_key.as_bytes(), sequence, ValueKind::Value)
}

#[test]
fn test_builder_creates_file() {
    let (_temp, path) = setup();
    let mut builder = TableBuilder::new(&path, &Config::default()).unwrap();
    builder.add(&ikey("a", 1), b"1").unwrap();
    let summary = builder.finish().unwrap();

    assert!(path.exists());
    assert_eq!(std::fs::metadata(&path).unwrap().len(), summary.file_size);
}

#[test]
fn test_builder_tracks_key_range() {
    let (_temp, path) = setup();
    let mut builder = TableBuilder::new(&path, &Config::default()).unwrap();
    builder.add(&ikey("apple", 3), b"x").unwrap();
    builder.add(&ikey("banana", 2), b"y").unwrap();
    builder.add(&ikey("cherry", 1), b"z").unwrap();
    assert_eq!(builder.entry_count(), 3);

    let summary = builder.finish().unwrap();
    assert_eq!(summary.smallest, ikey("apple", 3));
    assert_eq!(summary.largest, ikey("cherry", 1));
    assert_eq!(summary.entry_count, 3);
}

#[test]
fn test_builder_with_tombstone() {
    let (_temp, path) = setup();
    let mut builder = TableBuilder::new(&path, &Config::default()).unwrap();
    builder.add(&ikey("k", 2), b"").unwrap();
    builder
        .add(&encode_internal_key(b"k", 1, ValueKind::Deletion), b"")
        .unwrap();

    let summary = builder.finish().unwrap();
    assert_eq!(summary.entry_count, 2);
}

#[test]
fn test_compression_shrinks_repetitive_data() {
    let temp_dir = TempDir::new().unwrap();
    let build = |name: &str, compression: bool| {
        let path = temp_dir.path().join(name);
        let config = Config::builder().compression(compression).build();
        let mut builder = TableBuilder::new(&path, &config).unwrap();
        for i in 0..1000u64 {
            builder
                .add(&ikey(&format!("key{:05}", i), i + 1), &[b'x'; 200])
                .unwrap();
        }
        builder.finish().unwrap().file_size
    };

    let plain = build("000001.ldb", false);
    let compressed = build("000002.ldb", true);
    assert!(compressed < plain / 2, "{} vs {}", compressed, plain);
    assert_eq!(Config::default().compression, CompressionType::Lz4);
}

#[test]
fn test_abandon_removes_file() {
    let (_temp, path) = setup();
    let mut builder = TableBuilder::new(&path, &Config::default()).unwrap();
    builder.add(&ikey("a", 1), b"1").unwrap();
    builder.abandon().unwrap();

    assert!(!path.exists());
}
