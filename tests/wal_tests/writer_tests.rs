//! Tests for WAL Writer
//!
//! These tests verify:
//! - Appending entries and size tracking
//! - Reopening appends instead of truncating
//! - Integration with reader

use std::path::PathBuf;

use stratakv::wal::{Operation, WalEntry, WalReader, WalWriter, HEADER_SIZE};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("000001.log");
    (temp_dir, wal_path)
}

fn entry(sequence: u64, key: &str) -> WalEntry {
    WalEntry::new(
        sequence,
        vec![Operation::Put {
            key: key.as_bytes().to_vec(),
            value: b"value".to_vec(),
        }],
    )
}

fn read_all(path: &PathBuf) -> Vec<WalEntry> {
    WalReader::open(path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap()
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_new_writer_is_empty() {
    let (_temp, wal_path) = setup_temp_wal();
    let writer = WalWriter::open(&wal_path).unwrap();

    assert!(writer.is_empty());
    assert_eq!(writer.entries_written(), 0);
    assert!(wal_path.exists());
}

#[test]
fn test_append_tracks_size() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path).unwrap();

    let first = entry(1, "a");
    writer.append(&first, false).unwrap();
    let expected = (HEADER_SIZE + first.serialize().unwrap().len()) as u64;

    assert_eq!(writer.len(), expected);
    assert_eq!(writer.entries_written(), 1);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), expected);
}

#[test]
fn test_write_then_read() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        for i in 1..=50 {
            writer.append(&entry(i, &format!("key{}", i)), i % 10 == 0).unwrap();
        }
        writer.sync().unwrap();
    }

    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 50);
    for (i, e) in entries.iter().enumerate() {
        assert_eq!(e.sequence, i as u64 + 1);
    }
}

#[test]
fn test_reopen_appends() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        writer.append(&entry(1, "a"), true).unwrap();
    }
    {
        let mut writer = WalWriter::open(&wal_path).unwrap();
        assert!(!writer.is_empty());
        writer.append(&entry(2, "b"), true).unwrap();
    }

    let entries = read_all(&wal_path);
    assert_eq!(entries, vec![entry(1, "a"), entry(2, "b")]);
}
