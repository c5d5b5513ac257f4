//! # replidb Sync Protocol
//!
//! Sync exchange messages and their stream codec for replidb.
//!
//! This crate provides:
//! - `ExchangeDoc` and the request/response messages of an exchange round
//! - `SyncInfo` and `RecordSyncInfo` for the sync state handshake
//! - The line-oriented sync stream codec
//! - `ErrorKind` for signaling sync errors over the wire
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod stream;

pub use error::{ErrorKind, ProtocolError, ProtocolResult};
pub use messages::{
    decode_reply, ErrorBody, ExchangeDoc, ExchangeHeader, ExchangeRequest, ExchangeResponse, RecordSyncInfo,
    RequestHeader, SyncInfo,
};
pub use stream::{decode_stream, encode_error_stream, encode_stream};
