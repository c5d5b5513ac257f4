//! Error types for the sync protocol.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Error kinds that can be signaled by the other side of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Transient failure; the exchange may be retried.
    Unavailable,
    /// A claimed generation is behind what was recorded (rollback).
    InvalidGeneration,
    /// Same generation, different history (divergence).
    InvalidTransactionId,
    /// Two replicas share an identity.
    InvalidReplicaUid,
    /// A write was based on a stale revision.
    RevisionConflict,
    /// The other side could not parse what it received.
    BrokenSyncStream,
    /// The other side's store is missing, corrupted or closed; retrying
    /// does not help.
    StorageFailure,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::InvalidGeneration => "invalid_generation",
            Self::InvalidTransactionId => "invalid_transaction_id",
            Self::InvalidReplicaUid => "invalid_replica_uid",
            Self::RevisionConflict => "revision_conflict",
            Self::BrokenSyncStream => "broken_sync_stream",
            Self::StorageFailure => "storage_failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unavailable" => Ok(Self::Unavailable),
            "invalid_generation" => Ok(Self::InvalidGeneration),
            "invalid_transaction_id" => Ok(Self::InvalidTransactionId),
            "invalid_replica_uid" => Ok(Self::InvalidReplicaUid),
            "revision_conflict" => Ok(Self::RevisionConflict),
            "broken_sync_stream" => Ok(Self::BrokenSyncStream),
            "storage_failure" => Ok(Self::StorageFailure),
            other => Err(ProtocolError::broken(format!("unknown error kind {other:?}"))),
        }
    }
}

/// Errors that can occur while encoding or decoding exchange payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not a well-formed sync stream.
    #[error("broken sync stream: {reason}")]
    BrokenSyncStream {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The other side reported an error.
    #[error("remote error {kind}{}", detail(.message))]
    Remote {
        /// Signaled kind.
        kind: ErrorKind,
        /// Optional human readable detail.
        message: Option<String>,
    },

    /// A message could not be serialized.
    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

fn detail(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl ProtocolError {
    /// Creates a broken sync stream error.
    pub fn broken(reason: impl Into<String>) -> Self {
        Self::BrokenSyncStream {
            reason: reason.into(),
        }
    }

    /// Creates the error signaled by a remote error object.
    ///
    /// A remote broken stream report is surfaced as a broken stream.
    pub fn remote(kind: ErrorKind, message: Option<String>) -> Self {
        match kind {
            ErrorKind::BrokenSyncStream => Self::broken(
                message.unwrap_or_else(|| "reported by the other side".to_string()),
            ),
            kind => Self::Remote { kind, message },
        }
    }

    /// Returns the kind this error is signaled as on the wire.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Remote { kind, .. } => Some(*kind),
            Self::BrokenSyncStream { .. } => Some(ErrorKind::BrokenSyncStream),
            Self::Encode(_) => None,
        }
    }

    /// Returns true if the stream was malformed.
    #[must_use]
    pub fn is_broken_stream(&self) -> bool {
        matches!(self, Self::BrokenSyncStream { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_wire_names() {
        for kind in [
            ErrorKind::Unavailable,
            ErrorKind::InvalidGeneration,
            ErrorKind::InvalidTransactionId,
            ErrorKind::InvalidReplicaUid,
            ErrorKind::RevisionConflict,
            ErrorKind::BrokenSyncStream,
            ErrorKind::StorageFailure,
        ] {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_broken_stream() {
        let err = "?".parse::<ErrorKind>().unwrap_err();
        assert!(err.is_broken_stream());
    }

    #[test]
    fn remote_error_display() {
        let err = ProtocolError::remote(ErrorKind::Unavailable, None);
        assert_eq!(err.to_string(), "remote error unavailable");
        assert_eq!(err.kind(), Some(ErrorKind::Unavailable));

        let err = ProtocolError::remote(ErrorKind::InvalidGeneration, Some("behind".into()));
        assert_eq!(err.to_string(), "remote error invalid_generation: behind");
    }

    #[test]
    fn remote_broken_stream_is_local_broken_stream() {
        let err = ProtocolError::remote(ErrorKind::BrokenSyncStream, Some("missing comma".into()));
        assert!(err.is_broken_stream());
        assert_eq!(err.kind(), Some(ErrorKind::BrokenSyncStream));
    }
}
