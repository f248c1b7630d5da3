//! Write batches
//!
//! A batch collects puts and deletes that `Engine::write` applies
//! atomically: one WAL record, one contiguous sequence range.

use crate::wal::Operation;

/// Per-operation bookkeeping counted by `approximate_size`
const OPERATION_OVERHEAD: usize = 12;

/// An ordered list of puts and deletes applied as a unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    operations: Vec<Operation>,
    size: usize,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put; a later operation on the same key wins
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.push(Operation::Put {
            key: key.into(),
            value: value.into(),
        })
    }

    /// Queue a delete
    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.push(Operation::Delete { key: key.into() })
    }

    fn push(&mut self, op: Operation) -> &mut Self {
        self.size += op.approximate_size() + OPERATION_OVERHEAD;
        self.operations.push(op);
        self
    }

    /// Drop every queued operation
    pub fn clear(&mut self) {
        self.operations.clear();
        self.size = 0;
    }

    /// Number of queued operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Approximate encoded size of the batch in bytes
    pub fn approximate_size(&self) -> usize {
        self.size
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub(crate) fn into_operations(self) -> Vec<Operation> {
        self.operations
    }
}

impl Extend<Operation> for WriteBatch {
    fn extend<T: IntoIterator<Item = Operation>>(&mut self, iter: T) {
        for op in iter {
            self.push(op);
        }
    }
}
