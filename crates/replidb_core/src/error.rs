//! Error types for replidb core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in document store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] replidb_storage::StorageError),

    /// JSON content could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A log record could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A replayed log contradicts itself.
    #[error("log corruption: {message}")]
    LogCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The caller wrote from a stale revision.
    #[error("revision conflict on document {doc_id}")]
    RevisionConflict {
        /// The document that was written.
        doc_id: String,
    },

    /// The document does not exist.
    #[error("document does not exist: {doc_id}")]
    DocumentDoesNotExist {
        /// The missing document.
        doc_id: String,
    },

    /// The document is already a tombstone.
    #[error("document already deleted: {doc_id}")]
    DocumentAlreadyDeleted {
        /// The deleted document.
        doc_id: String,
    },

    /// The document has unresolved conflicts and must be resolved first.
    #[error("document has conflicts: {doc_id}")]
    ConflictedDoc {
        /// The conflicted document.
        doc_id: String,
    },

    /// A document id is not acceptable.
    #[error("invalid document id: {doc_id:?}")]
    InvalidDocId {
        /// The rejected id.
        doc_id: String,
    },

    /// A revision string does not parse.
    #[error("invalid revision: {revision:?}")]
    InvalidRevision {
        /// The rejected revision.
        revision: String,
    },

    /// A generation is behind what was previously recorded, or beyond
    /// what exists.
    #[error("invalid generation {generation} (known {known})")]
    InvalidGeneration {
        /// The generation that was claimed.
        generation: u64,
        /// The generation it was checked against.
        known: u64,
    },

    /// The generation matches but the history diverged.
    #[error("invalid transaction id at generation {generation}: expected {expected:?}, got {actual:?}")]
    InvalidTransactionId {
        /// The generation that was checked.
        generation: u64,
        /// The transaction id on record.
        expected: String,
        /// The transaction id that was claimed.
        actual: String,
    },

    /// The store was deleted and accepts no more writes.
    #[error("document store is closed")]
    StoreClosed,

    /// Two replicas share an identity.
    #[error("invalid replica uid: {replica_uid}")]
    InvalidReplicaUid {
        /// The offending uid.
        replica_uid: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Creates a log corruption error.
    pub fn log_corruption(message: impl Into<String>) -> Self {
        Self::LogCorruption {
            message: message.into(),
        }
    }

    /// Creates a revision conflict error.
    pub fn revision_conflict(doc_id: impl Into<String>) -> Self {
        Self::RevisionConflict {
            doc_id: doc_id.into(),
        }
    }

    /// Creates a document does not exist error.
    pub fn document_does_not_exist(doc_id: impl Into<String>) -> Self {
        Self::DocumentDoesNotExist {
            doc_id: doc_id.into(),
        }
    }

    /// Creates an invalid revision error.
    pub fn invalid_revision(revision: impl Into<String>) -> Self {
        Self::InvalidRevision {
            revision: revision.into(),
        }
    }

    /// Creates an invalid replica uid error.
    pub fn invalid_replica_uid(replica_uid: impl Into<String>) -> Self {
        Self::InvalidReplicaUid {
            replica_uid: replica_uid.into(),
        }
    }

    /// Returns true if the store's backing storage was never created.
    #[must_use]
    pub fn is_not_provisioned(&self) -> bool {
        matches!(
            self,
            Self::Storage(replidb_storage::StorageError::NotProvisioned { .. })
        )
    }
}
