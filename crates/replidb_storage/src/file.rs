//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use crate::frame::{decode_frames, encode_frame};
use fs2::FileExt;
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// A file-based storage backend.
///
/// Records are stored as CRC-checked frames in a single append-only file.
/// The file is locked exclusively while open so two processes never append
/// to the same replica.
///
/// # Durability
///
/// - `flush()` calls `File::flush()` to push data to the OS
/// - `sync()` calls `File::sync_all()` to ensure data is on disk
///
/// # Recovery
///
/// On open, a frame cut short at the end of the file (a crash mid-append)
/// is truncated away. A checksum mismatch on a complete frame fails the
/// open with [`StorageError::Corrupted`].
///
/// # Example
///
/// ```no_run
/// use replidb_storage::{StorageBackend, FileBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("replica.log"), true).unwrap();
/// backend.append_record(b"persistent record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    count: RwLock<u64>,
    /// Set when a torn frame could not be removed; appends are refused.
    closed: AtomicBool,
}

impl FileBackend {
    /// Opens a file backend at the given path.
    ///
    /// When `create_if_missing` is false and no file exists, fails with
    /// [`StorageError::NotProvisioned`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is locked by another
    /// handle, or holds a corrupted record.
    pub fn open(path: &Path, create_if_missing: bool) -> StorageResult<Self> {
        if !create_if_missing && !path.exists() {
            return Err(StorageError::NotProvisioned {
                path: path.to_path_buf(),
            });
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| StorageError::Locked {
            path: path.to_path_buf(),
        })?;

        let mut data = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut data)?;
        let decoded = decode_frames(&data)?;

        if decoded.truncated_tail {
            tracing::warn!(
                path = %path.display(),
                valid_len = decoded.valid_len,
                file_len = data.len(),
                "discarding partial record at end of store"
            );
            file.set_len(decoded.valid_len)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            count: RwLock::new(decoded.records.len() as u64),
            closed: AtomicBool::new(false),
        })
    }

    /// Opens a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path, true)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn append_record(&mut self, record: &[u8]) -> StorageResult<u64> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        let frame = encode_frame(record)?;
        let mut file = self.file.write();
        let mut count = self.count.write();

        let start = file.seek(SeekFrom::End(0))?;
        if let Err(e) = file.write_all(&frame) {
            // A torn frame followed by more appends would read back as
            // corruption instead of a discardable tail
            if let Err(truncate_err) = file.set_len(start) {
                tracing::warn!(
                    path = %self.path.display(),
                    offset = start,
                    error = %truncate_err,
                    "could not remove partial record, refusing further appends"
                );
                self.closed.store(true, Ordering::Release);
            }
            return Err(e.into());
        }

        let index = *count;
        *count += 1;
        Ok(index)
    }

    fn read_records(&self) -> StorageResult<Vec<Vec<u8>>> {
        let mut file = self.file.write();
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(decode_frames(&data)?.records)
    }

    fn record_count(&self) -> StorageResult<u64> {
        Ok(*self.count.read())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.write().flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.write();
        file.sync_all()?;
        Ok(())
    }

    fn clear(&mut self) -> StorageResult<()> {
        let file = self.file.write();
        let mut count = self.count.write();
        file.set_len(0)?;
        file.sync_all()?;
        *count = 0;
        self.closed.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");

        let backend = FileBackend::open(&path, true).unwrap();
        assert_eq!(backend.record_count().unwrap(), 0);
        assert!(path.exists());
    }

    #[test]
    fn file_missing_without_create_is_not_provisioned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.log");

        let result = FileBackend::open(&path, false);
        assert!(matches!(result, Err(StorageError::NotProvisioned { .. })));
        assert!(!path.exists());
    }

    #[test]
    fn failed_append_that_cannot_be_undone_closes_backend() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");
        drop(FileBackend::open(&path, true).unwrap());

        // A read-only handle fails both the write and the truncate
        let mut backend = FileBackend {
            path: path.clone(),
            file: RwLock::new(File::open(&path).unwrap()),
            count: RwLock::new(0),
            closed: AtomicBool::new(false),
        };
        assert!(matches!(
            backend.append_record(b"torn"),
            Err(StorageError::Io(_))
        ));
        assert!(matches!(
            backend.append_record(b"next"),
            Err(StorageError::Closed)
        ));
        assert_eq!(backend.record_count().unwrap(), 0);
    }

    #[test]
    fn file_append_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");

        let mut backend = FileBackend::open(&path, true).unwrap();
        assert_eq!(backend.append_record(b"hello").unwrap(), 0);
        assert_eq!(backend.append_record(b"world").unwrap(), 1);

        assert_eq!(
            backend.read_records().unwrap(),
            vec![b"hello".to_vec(), b"world".to_vec()]
        );
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");

        {
            let mut backend = FileBackend::open(&path, true).unwrap();
            backend.append_record(b"persistent").unwrap();
            backend.sync().unwrap();
        }

        {
            let backend = FileBackend::open(&path, false).unwrap();
            assert_eq!(backend.record_count().unwrap(), 1);
            assert_eq!(backend.read_records().unwrap(), vec![b"persistent".to_vec()]);
        }
    }

    #[test]
    fn file_partial_tail_is_truncated_on_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");

        {
            let mut backend = FileBackend::open(&path, true).unwrap();
            backend.append_record(b"kept").unwrap();
            backend.sync().unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[42, 0, 0, 0, 1, 2]).unwrap();
        }

        let mut backend = FileBackend::open(&path, false).unwrap();
        assert_eq!(backend.record_count().unwrap(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);

        assert_eq!(backend.append_record(b"next").unwrap(), 1);
        assert_eq!(
            backend.read_records().unwrap(),
            vec![b"kept".to_vec(), b"next".to_vec()]
        );
    }

    #[test]
    fn file_corrupted_record_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");

        {
            let mut backend = FileBackend::open(&path, true).unwrap();
            backend.append_record(b"will be damaged").unwrap();
            backend.sync().unwrap();
        }
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let result = FileBackend::open(&path, false);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");

        let _first = FileBackend::open(&path, true).unwrap();
        let second = FileBackend::open(&path, true);
        assert!(matches!(second, Err(StorageError::Locked { .. })));
    }

    #[test]
    fn file_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replica.log");

        let mut backend = FileBackend::open(&path, true).unwrap();
        backend.append_record(b"gone").unwrap();
        backend.clear().unwrap();

        assert_eq!(backend.record_count().unwrap(), 0);
        assert!(backend.read_records().unwrap().is_empty());
        assert_eq!(backend.append_record(b"fresh").unwrap(), 0);
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("replica.log");

        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        assert_eq!(backend.record_count().unwrap(), 0);
        assert_eq!(backend.path(), path);
    }
}
