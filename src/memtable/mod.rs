//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Track size for flush triggers
//! - Ordered iteration for table creation and merged reads
//!
//! ## Data Structure Choice
//! A BTreeMap keyed by internal key, wrapped in a RwLock:
//! - Every version of a key is kept, newest first
//! - Snapshot reads pick the newest version at or below their sequence
//! - Iterators re-seek on every step instead of holding the lock

mod iterator;
mod table;

pub use iterator::MemTableIterator;
pub use table::MemTable;
