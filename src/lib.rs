//! # StrataKV
//!
//! An embedded, ordered key-value storage engine with:
//! - Write-Ahead Logging (WAL) for durability
//! - Crash recovery with torn-tail handling
//! - Leveled compaction of sorted, block-compressed table files
//! - Snapshots and bidirectional, range-bounded iterators
//! - Single-writer/multi-reader concurrency model
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │     WAL     │          │  MemTable   │──── freeze ───┐
//!   │  (Append)   │          │ (BTreeMap)  │               │
//!   └─────────────┘          └─────────────┘               ▼
//!                                                 ┌────────────────┐
//!                                                 │ Background     │
//!                                                 │ worker: flush  │
//!                                                 │ and compaction │
//!                                                 └───────┬────────┘
//!                                                         ▼
//!   ┌──────────────┐   names   ┌─────────────────────────────────┐
//!   │   MANIFEST   │──────────▶│ Tables: L0 │ L1 │ ... │ L6      │
//!   │ (VersionSet) │           └─────────────────────────────────┘
//!   └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod key;

pub mod batch;
pub mod filename;
pub mod iterator;
pub mod memtable;
pub mod snapshot;
pub mod table;
pub mod version;
pub mod wal;

mod compaction;
mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use batch::WriteBatch;
pub use config::{
    CompressionType, Config, ConfigBuilder, IteratorOptions, ReadOptions, WriteOptions,
};
pub use engine::{destroy, repair, Engine, RepairReport};
pub use error::{Result, StrataError};
pub use iterator::DbIterator;
pub use snapshot::Snapshot;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of StrataKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
