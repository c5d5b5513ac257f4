//! Storage backend trait definition.

use crate::error::StorageResult;

/// A record-oriented, append-only storage backend.
///
/// Backends are **opaque record stores**. The document store encodes each
/// state change (a document mutation, a sync state write) as one record
/// and hands it to the backend; on open it reads every record back and
/// replays them in order.
///
/// # Invariants
///
/// - `append_record` is atomic: a crash mid-append never exposes a
///   partial record to `read_records`
/// - `read_records` returns records in exactly the order they were appended
/// - Records are never rewritten; `clear` is the only removal
/// - Backends must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Appends one record and returns its index (0-based).
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written. On error the
    /// record must not become visible.
    fn append_record(&mut self, record: &[u8]) -> StorageResult<u64>;

    /// Reads every durable record in append order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::Corrupted`] if a complete record fails
    /// its integrity check, or an I/O error.
    fn read_records(&self) -> StorageResult<Vec<Vec<u8>>>;

    /// Returns the number of records appended so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the count cannot be determined.
    fn record_count(&self) -> StorageResult<u64>;

    /// Pushes appended records to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Syncs all records and metadata to durable storage.
    ///
    /// This is a stronger guarantee than `flush`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Removes every record.
    ///
    /// Used only for whole-store deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be removed.
    fn clear(&mut self) -> StorageResult<()>;
}
