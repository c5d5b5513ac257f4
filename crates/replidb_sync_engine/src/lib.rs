//! # replidb Sync Engine
//!
//! Sync exchange and synchronizer for replidb.
//!
//! This crate provides:
//! - The target side of an exchange round (`sync_exchange`)
//! - Sync targets over a local store or over the sync stream codec
//! - Named phase checkpoints observable through `SyncObserver`
//! - The `Synchronizer` driving a two-way session, with retry
//!
//! ## Architecture
//!
//! A session is initiated by the *source* replica against a *target*:
//! 1. Ask the target what it knows about the source (`get_sync_info`)
//! 2. Push the source's changes the target has not seen
//! 3. Receive the target's changes the source has not seen
//! 4. Record on both sides how far each has incorporated the other
//!
//! ## Key Invariants
//!
//! - Document application is idempotent (revision dominance), so any
//!   failed session can be retried from the start
//! - Sync state is never recorded when a local write raced the session
//! - Rollback and divergence of a peer are reported, never repaired

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod exchange;
mod observer;
mod stream_target;
mod synchronizer;
mod target;

pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use exchange::{sync_exchange, DocAtGen};
pub use observer::{PhaseRecorder, SyncObserver, SyncPhase};
pub use stream_target::{ExchangeClient, ExchangeServer, LoopbackClient, StreamSyncTarget};
pub use synchronizer::{SyncStats, Synchronizer};
pub use target::{LocalSyncTarget, SyncTarget};
