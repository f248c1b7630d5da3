//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a clean WAL (no corruption)
//! - Recovery from an empty WAL
//! - Torn tails are truncated, or rejected in paranoid mode
//! - Entries at or below the watermark are skipped
//! - Verify mode (stats only, file untouched)

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use stratakv::wal::{Operation, WalEntry, WalRecovery, WalWriter};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("000001.log");
    (temp_dir, wal_path)
}

/// Write `count` single-put entries with sequences 1..=count
fn write_entries_via_writer(path: &PathBuf, count: u64) {
    let mut writer = WalWriter::open(path).unwrap();
    for i in 1..=count {
        let entry = WalEntry::new(
            i,
            vec![Operation::Put {
                key: format!("key{}", i).into_bytes(),
                value: format!("value{}", i).into_bytes(),
            }],
        );
        writer.append(&entry, false).unwrap();
    }
    writer.sync().unwrap();
}

fn append_garbage(path: &PathBuf, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.last_sequence, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_sequence, 10);
    assert!(!result.was_truncated);
}

#[test]
fn test_replay_skips_entries_below_watermark() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let mut applied = Vec::new();
    let result = WalRecovery::replay(&wal_path, 6, false, |entry| {
        applied.push(entry.sequence);
        Ok(())
    })
    .unwrap();

    assert_eq!(applied, vec![7, 8, 9, 10]);
    assert_eq!(result.entries_skipped, 6);
    assert_eq!(result.last_sequence, 10);
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_torn_tail_is_truncated() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);
    let good_len = std::fs::metadata(&wal_path).unwrap().len();
    append_garbage(&wal_path, &[0xFF; 5]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 5);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), good_len);

    // A second pass finds a clean log
    let (_, again) = WalRecovery::recover(&wal_path).unwrap();
    assert!(!again.was_truncated);
}

#[test]
fn test_torn_tail_rejected_when_paranoid() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    append_garbage(&wal_path, &[0xFF; 5]);

    let err = WalRecovery::replay(&wal_path, 0, true, |_| Ok(())).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_corruption_in_middle_fails() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);

    let mut bytes = std::fs::read(&wal_path).unwrap();
    bytes[10] ^= 0x55;
    std::fs::write(&wal_path, bytes).unwrap();

    let err = WalRecovery::recover(&wal_path).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn test_bad_length_keeps_later_records() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);
    let len = std::fs::metadata(&wal_path).unwrap().len();

    let mut bytes = std::fs::read(&wal_path).unwrap();
    bytes[5] ^= 0x10;
    std::fs::write(&wal_path, bytes).unwrap();

    let err = WalRecovery::recover(&wal_path).unwrap_err();
    assert!(err.is_corruption());
    // Nothing was truncated away
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), len);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    append_garbage(&wal_path, &[0x01, 0x02]);
    let len = std::fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 3);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), len);
}
