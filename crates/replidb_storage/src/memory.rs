//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory storage backend.
///
/// This backend keeps every record in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral replicas that don't need persistence
///
/// Cloning produces an independent copy of the records, which is how
/// tests fork a replica (for example to simulate restoring a backup).
///
/// # Example
///
/// ```rust
/// use replidb_storage::{StorageBackend, InMemoryBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.append_record(b"first").unwrap();
/// let copy = backend.clone();
/// backend.append_record(b"second").unwrap();
/// assert_eq!(copy.record_count().unwrap(), 1);
/// assert_eq!(backend.record_count().unwrap(), 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    records: RwLock<Vec<Vec<u8>>>,
    fail_appends: AtomicBool,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend preloaded with records.
    #[must_use]
    pub fn with_records(records: Vec<Vec<u8>>) -> Self {
        Self {
            records: RwLock::new(records),
            fail_appends: AtomicBool::new(false),
        }
    }

    /// Makes every following append fail with [`StorageError::Closed`].
    ///
    /// Used by tests to simulate a store that stops accepting writes.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl Clone for InMemoryBackend {
    fn clone(&self) -> Self {
        Self::with_records(self.records.read().clone())
    }
}

impl StorageBackend for InMemoryBackend {
    fn append_record(&mut self, record: &[u8]) -> StorageResult<u64> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        let mut records = self.records.write();
        let index = records.len() as u64;
        records.push(record.to_vec());
        Ok(index)
    }

    fn read_records(&self) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.records.read().clone())
    }

    fn record_count(&self) -> StorageResult<u64> {
        Ok(self.records.read().len() as u64)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Nothing is buffered
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.records.write().clear();
        Ok(())
    }
}
