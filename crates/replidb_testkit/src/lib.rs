//! # replidb testkit
//!
//! Test utilities for replidb.
//!
//! This crate provides:
//! - Store fixtures, in memory and file backed
//! - A fault-injecting storage backend
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use replidb_testkit::prelude::*;
//! use serde_json::json;
//!
//! let (a, b) = store_pair("a", "b");
//! a.create_doc(json!({"k": 1})).unwrap();
//! assert_eq!(doc_contents(&a).len(), 1);
//! assert!(doc_contents(&b).is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
