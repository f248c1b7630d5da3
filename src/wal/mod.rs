//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append one record per write batch before the memtable is touched
//! - CRC32 checksums for corruption detection
//! - Sequence numbers for ordering and replay filtering
//! - Crash recovery with torn-tail truncation
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Record 1                                 │
//! │ ┌─────────┬─────────┬──────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Payload (bincode)│ │
//! │ └─────────┴─────────┴──────────────────┘ │
//! ├──────────────────────────────────────────┤
//! │ Record 2                                 │
//! │ ┌─────────┬─────────┬──────────────────┐ │
//! │ │ CRC (4) │ Len (4) │ Payload (bincode)│ │
//! │ └─────────┴─────────┴──────────────────┘ │
//! └──────────────────────────────────────────┘
//! ```
//!
//! The CRC covers the length field and the payload. The same framing is used
//! by the manifest.

mod entry;
pub(crate) mod frame;
mod reader;
mod recovery;
mod writer;

pub use entry::{Operation, WalEntry};
pub use frame::HEADER_SIZE;
pub use reader::WalReader;
pub use recovery::{RecoveryResult, WalRecovery};
pub use writer::WalWriter;
