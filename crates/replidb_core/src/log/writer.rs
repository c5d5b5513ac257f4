//! Log writer and reader.

use crate::error::CoreResult;
use crate::log::record::LogRecord;
use parking_lot::Mutex;
use replidb_storage::StorageBackend;

/// Appends records to a store's backend and reads them back for replay.
pub struct LogWriter {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_write: bool,
}

impl LogWriter {
    /// Creates a log writer over a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_write,
        }
    }

    /// Appends a record and returns its index.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written. A failed
    /// append leaves no trace of the record.
    pub fn append(&self, record: &LogRecord) -> CoreResult<u64> {
        let data = record.encode()?;
        let mut backend = self.backend.lock();
        let index = backend.append_record(&data)?;
        if self.sync_on_write {
            backend.sync()?;
        } else {
            backend.flush()?;
        }
        tracing::trace!(index, kind = record.kind(), "appended log record");
        Ok(index)
    }

    /// Reads and decodes every record in append order.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be read or decoded.
    pub fn read_all(&self) -> CoreResult<Vec<LogRecord>> {
        let backend = self.backend.lock();
        backend
            .read_records()?
            .iter()
            .map(|data| LogRecord::decode(data))
            .collect()
    }

    /// Returns the raw records, for copying a replica.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn raw_records(&self) -> CoreResult<Vec<Vec<u8>>> {
        Ok(self.backend.lock().read_records()?)
    }

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sync fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be cleared.
    pub fn clear(&self) -> CoreResult<()> {
        self.backend.lock().clear()?;
        Ok(())
    }
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_storage::InMemoryBackend;

    #[test]
    fn append_and_read_back() {
        let writer = LogWriter::new(Box::new(InMemoryBackend::new()), false);
        let first = LogRecord::Identity {
            replica_uid: "r".into(),
        };
        let second = LogRecord::ReplicaGen {
            replica_uid: "other".into(),
            generation: 3,
            trans_id: "T-3".into(),
        };
        assert_eq!(writer.append(&first).unwrap(), 0);
        assert_eq!(writer.append(&second).unwrap(), 1);
        assert_eq!(writer.read_all().unwrap(), vec![first, second]);
    }

    #[test]
    fn failed_append_propagates() {
        let backend = InMemoryBackend::new();
        backend.set_fail_appends(true);
        let writer = LogWriter::new(Box::new(backend), true);
        let result = writer.append(&LogRecord::Identity {
            replica_uid: "r".into(),
        });
        assert!(result.is_err());
        assert!(writer.read_all().unwrap().is_empty());
    }

    #[test]
    fn clear_removes_records() {
        let writer = LogWriter::new(Box::new(InMemoryBackend::new()), false);
        writer
            .append(&LogRecord::Identity {
                replica_uid: "r".into(),
            })
            .unwrap();
        writer.clear().unwrap();
        assert!(writer.read_all().unwrap().is_empty());
    }
}
