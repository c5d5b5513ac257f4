//! Persistent replica log.
//!
//! Every state change of a document store is one record in its storage
//! backend. Opening a store replays the records in order; the transaction
//! log, the documents and the sync state are all rebuilt from them.
//!
//! ## Record Kinds
//!
//! - `Identity` - the replica uid, written once when the store is created
//! - `Mutation` - one transaction log entry, carrying the complete
//!   post-state of the document (revision, content, conflicts) and the
//!   provenance of a synced write
//! - `Conflicts` - a change to a document's conflict set that is not a
//!   mutation of the document itself
//! - `ReplicaGen` - a sync state tracker write
//!
//! ## Invariants
//!
//! - Records are **append-only** and replayed in append order
//! - A `Mutation` and the provenance it carries land in a single record,
//!   so a crash never separates them
//! - Replay is **idempotent** - each record overwrites state

mod record;
mod writer;

pub use record::{ConflictRecord, LogRecord, SourceRecord};
pub use writer::LogWriter;
