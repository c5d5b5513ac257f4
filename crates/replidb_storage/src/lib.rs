//! # replidb Storage
//!
//! Append-only record storage for replidb replicas.
//!
//! A replica persists every state change as one opaque record. Backends
//! store and return those records in append order; they never interpret
//! the bytes. The document store rebuilds its state by replaying them.
//!
//! ## Design Principles
//!
//! - A record is appended atomically: after a crash it is either fully
//!   visible or absent
//! - Records are never modified or reordered
//! - The only removal is [`StorageBackend::clear`] (whole-store deletion)
//! - Must be `Send + Sync` so a store can be shared across sync sessions
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For tests and ephemeral replicas
//! - [`FileBackend`] - A single framed, append-only file
//!
//! ## Example
//!
//! ```rust
//! use replidb_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let index = backend.append_record(b"hello world").unwrap();
//! assert_eq!(index, 0);
//! assert_eq!(backend.read_records().unwrap(), vec![b"hello world".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod frame;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use frame::{compute_crc32, decode_frames, encode_frame, DecodedFrames, FRAME_HEADER_SIZE};
pub use memory::InMemoryBackend;
