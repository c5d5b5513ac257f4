//! Core type definitions for replidb.

use std::fmt;

/// Number of mutations ever applied to a replica's transaction log.
pub type Generation = u64;

/// Mints a document id (`D-` followed by 32 hex digits).
#[must_use]
pub fn new_doc_id() -> String {
    format!("D-{}", uuid::Uuid::new_v4().simple())
}

/// Mints a transaction id (`T-` followed by 32 hex digits).
#[must_use]
pub fn new_trans_id() -> String {
    format!("T-{}", uuid::Uuid::new_v4().simple())
}

/// Mints a replica uid.
#[must_use]
pub fn new_replica_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// One entry of the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionLogEntry {
    /// The document that was mutated.
    pub doc_id: String,
    /// The transaction id of the mutation.
    pub trans_id: String,
}

/// The latest change to one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Change {
    /// The document that changed.
    pub doc_id: String,
    /// Generation of its most recent mutation.
    pub generation: Generation,
    /// Transaction id of its most recent mutation.
    pub trans_id: String,
}

/// Result of [`crate::DocumentStore::whats_changed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhatsChanged {
    /// Current generation of the store.
    pub generation: Generation,
    /// Transaction id at the current generation (empty at generation 0).
    pub trans_id: String,
    /// One entry per changed document, ordered by generation.
    pub changes: Vec<Change>,
}

/// A generation/transaction id pair known about some replica.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ReplicaGen {
    /// The known generation.
    pub generation: Generation,
    /// The transaction id at that generation.
    pub trans_id: String,
}

impl ReplicaGen {
    /// Creates a generation/transaction id pair.
    pub fn new(generation: Generation, trans_id: impl Into<String>) -> Self {
        Self {
            generation,
            trans_id: trans_id.into(),
        }
    }
}

/// Provenance of a document applied by sync: which replica sent it, and
/// that replica's generation and transaction id at the change.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceInfo {
    /// Uid of the sending replica.
    pub replica_uid: String,
    /// Sender's generation at the change.
    pub generation: Generation,
    /// Sender's transaction id at the change.
    pub trans_id: String,
}

impl SourceInfo {
    /// Creates provenance information.
    pub fn new(
        replica_uid: impl Into<String>,
        generation: Generation,
        trans_id: impl Into<String>,
    ) -> Self {
        Self {
            replica_uid: replica_uid.into(),
            generation,
            trans_id: trans_id.into(),
        }
    }
}

/// What happened to a document offered to `put_doc_if_newer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PutState {
    /// The incoming revision was newer and became current.
    Inserted,
    /// The local revision is newer or equal; nothing was written.
    Superseded,
    /// The revisions are concurrent.
    Conflicted,
    /// The revisions were merged into a new local revision without a
    /// conflict.
    Autoresolved,
}

impl fmt::Display for PutState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inserted => "inserted",
            Self::Superseded => "superseded",
            Self::Conflicted => "conflicted",
            Self::Autoresolved => "autoresolved",
        };
        f.write_str(name)
    }
}

/// Outcome of `put_doc_if_newer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    /// What happened to the document.
    pub state: PutState,
    /// Store generation after the call.
    pub generation: Generation,
    /// Whether a transaction log entry was appended.
    pub written: bool,
    /// Whether the local revision was exactly the incoming one.
    pub converged: bool,
}
