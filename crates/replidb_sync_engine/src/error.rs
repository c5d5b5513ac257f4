//! Error types for the sync engine.

use crate::observer::SyncPhase;
use replidb_core::CoreError;
use replidb_storage::StorageError;
use replidb_sync_protocol::{ErrorKind, ProtocolError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Error of a local document store.
    #[error("database error: {0}")]
    Database(#[from] CoreError),

    /// Malformed payload, or an error signaled by the other side.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// An observer stopped the exchange at a phase.
    #[error("sync aborted at {phase}: {message}")]
    Aborted {
        /// Phase at which the exchange stopped.
        phase: SyncPhase,
        /// Reason given by the observer.
        message: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an error that aborts the exchange at `phase`.
    pub fn aborted(phase: SyncPhase, message: impl Into<String>) -> Self {
        Self::Aborted {
            phase,
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// Only transient failures are retryable. Rollback, divergence and
    /// identity errors describe a broken replica and never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            other => other.kind() == Some(ErrorKind::Unavailable),
        }
    }

    /// Returns the kind this error is signaled as over the wire.
    ///
    /// Errors of a local store map to the same kinds as errors reported by
    /// a remote one, so callers can match on either uniformly. I/O failures
    /// map to [`ErrorKind::Unavailable`]; a missing, corrupted, locked or
    /// closed store maps to [`ErrorKind::StorageFailure`].
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Database(err) => Some(match err {
                CoreError::InvalidGeneration { .. } => ErrorKind::InvalidGeneration,
                CoreError::InvalidTransactionId { .. } => ErrorKind::InvalidTransactionId,
                CoreError::InvalidReplicaUid { .. } => ErrorKind::InvalidReplicaUid,
                CoreError::RevisionConflict { .. } => ErrorKind::RevisionConflict,
                CoreError::Storage(StorageError::Io(_)) => ErrorKind::Unavailable,
                CoreError::Storage(_)
                | CoreError::StoreClosed
                | CoreError::LogCorruption { .. } => ErrorKind::StorageFailure,
                _ => return None,
            }),
            Self::Protocol(err) => err.kind(),
            Self::Transport { retryable: true, .. } => Some(ErrorKind::Unavailable),
            Self::Transport { .. } | Self::Aborted { .. } => None,
        }
    }

    /// Returns the kind reported to the other side of an exchange.
    ///
    /// Anything without a more precise kind is reported as unavailable.
    #[must_use]
    pub fn wire_kind(&self) -> ErrorKind {
        self.kind().unwrap_or(ErrorKind::Unavailable)
    }
}
