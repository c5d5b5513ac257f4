//! # replidb Core
//!
//! Replicated document store for replidb.
//!
//! This crate provides:
//! - Vector-clock revisions and their partial order
//! - The document store with conflict tracking
//! - The append-only transaction log and generations
//! - Per-peer sync state
//! - Write observers and field indexes
//!
//! ## Key Invariants
//!
//! - The generation equals the number of transaction log entries
//! - Every committed mutation is exactly one log record
//! - A store never accepts its own replica uid as a peer
//! - Known peer generations never move backwards

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod document;
mod error;
mod index;
mod log;
mod revision;
mod store;
mod sync_state;
mod types;

pub use config::StoreConfig;
pub use document::Document;
pub use error::{CoreError, CoreResult};
pub use index::{FieldIndex, WriteObserver};
pub use log::{ConflictRecord, LogRecord, LogWriter, SourceRecord};
pub use revision::{compare_revisions, RevisionOrdering, VectorClock};
pub use store::DocumentStore;
pub use sync_state::SyncStateTracker;
pub use types::{
    new_doc_id, new_replica_uid, new_trans_id, Change, Generation, PutOutcome, PutState,
    ReplicaGen, SourceInfo, TransactionLogEntry, WhatsChanged,
};
