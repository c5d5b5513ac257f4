//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A complete record failed its integrity check.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The backing store does not exist and creation was not requested.
    #[error("storage not provisioned at {}", path.display())]
    NotProvisioned {
        /// Where the store was expected.
        path: PathBuf,
    },

    /// Another process holds the store open.
    #[error("storage locked: {}", path.display())]
    Locked {
        /// Path of the locked store.
        path: PathBuf,
    },

    /// The storage refuses writes.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
