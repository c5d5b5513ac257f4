//! Fault injection for the storage layer.
//!
//! [`FaultyBackend`] wraps a real backend and fails appends according to a
//! shared [`FaultPlan`]. A failed append never reaches the inner backend,
//! so the store behaves exactly as if the write had been lost before
//! becoming durable.
//!
//! ## Usage
//!
//! ```rust
//! use replidb_testkit::faults::{faulty_store, FaultPlan};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let plan = Arc::new(FaultPlan::new());
//! let store = faulty_store("replica", plan.clone());
//!
//! plan.fail_when_contains(b"doomed");
//! assert!(store.create_doc_with_id(json!({}), "doomed").is_err());
//! assert!(store.create_doc_with_id(json!({}), "fine").is_ok());
//! assert_eq!(plan.failures(), 1);
//! ```

use parking_lot::Mutex;
use replidb_core::{DocumentStore, StoreConfig};
use replidb_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// When a [`FaultyBackend`] fails.
#[derive(Debug, Default)]
pub struct FaultPlan {
    triggers: Mutex<Vec<Vec<u8>>>,
    fail_next: AtomicUsize,
    failures: AtomicUsize,
    appends: AtomicUsize,
}

impl FaultPlan {
    /// Creates a plan that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every append whose record contains `needle`.
    pub fn fail_when_contains(&self, needle: &[u8]) {
        self.triggers.lock().push(needle.to_vec());
    }

    /// Fails the next `count` appends, whatever they contain.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Removes every trigger.
    pub fn reset(&self) {
        self.triggers.lock().clear();
        self.fail_next.store(0, Ordering::SeqCst);
    }

    /// Returns how many appends were failed.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Returns how many appends went through.
    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }

    fn should_fail(&self, record: &[u8]) -> bool {
        let forced = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        forced
            || self
                .triggers
                .lock()
                .iter()
                .any(|needle| contains(record, needle))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}

/// A storage backend wrapper that fails appends on demand.
pub struct FaultyBackend {
    inner: Box<dyn StorageBackend>,
    plan: Arc<FaultPlan>,
}

impl FaultyBackend {
    /// Wraps `inner`, failing as `plan` says.
    pub fn new(inner: Box<dyn StorageBackend>, plan: Arc<FaultPlan>) -> Self {
        Self { inner, plan }
    }
}

impl StorageBackend for FaultyBackend {
    fn append_record(&mut self, record: &[u8]) -> StorageResult<u64> {
        if self.plan.should_fail(record) {
            self.plan.failures.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Io(io::Error::other("simulated append failure")));
        }
        self.plan.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append_record(record)
    }

    fn read_records(&self) -> StorageResult<Vec<Vec<u8>>> {
        self.inner.read_records()
    }

    fn record_count(&self) -> StorageResult<u64> {
        self.inner.record_count()
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.inner.clear()
    }
}

/// Opens an in-memory store whose appends fail as `plan` says.
pub fn faulty_store(replica_uid: &str, plan: Arc<FaultPlan>) -> DocumentStore {
    let backend = FaultyBackend::new(Box::new(InMemoryBackend::new()), plan);
    DocumentStore::open(
        Box::new(backend),
        StoreConfig::new()
            .replica_uid(replica_uid)
            .sync_on_write(false),
    )
    .expect("Failed to open faulty store")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fail_next_counts_down() {
        let plan = Arc::new(FaultPlan::new());
        let store = faulty_store("test", plan.clone());
        plan.fail_next(2);

        assert!(store.create_doc(json!({})).is_err());
        assert!(store.create_doc(json!({})).is_err());
        assert!(store.create_doc(json!({})).is_ok());
        assert_eq!(plan.failures(), 2);
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_trigger_matches_record_bytes() {
        let plan = Arc::new(FaultPlan::new());
        let store = faulty_store("test", plan.clone());
        plan.fail_when_contains(b"doc-here2");

        assert!(store.create_doc_with_id(json!({}), "doc-here").is_ok());
        assert!(store.create_doc_with_id(json!({}), "doc-here2").is_err());
        assert!(store.get_doc("doc-here2", true).is_none());

        plan.reset();
        assert!(store.create_doc_with_id(json!({}), "doc-here2").is_ok());
        assert_eq!(store.generation(), 2);
    }

    #[test]
    fn test_plan_is_shared_across_threads() {
        let plan = Arc::new(FaultPlan::new());
        let store = Arc::new(faulty_store("test", plan.clone()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let plan = Arc::clone(&plan);
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let doomed = format!("doomed-{i}");
                    plan.fail_when_contains(doomed.as_bytes());
                    assert!(store.create_doc_with_id(json!({}), &doomed).is_err());
                    assert!(store.create_doc_with_id(json!({}), &format!("kept-{i}")).is_ok());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(plan.failures(), 4);
        assert_eq!(store.generation(), 4);
    }

    #[test]
    fn test_contains() {
        assert!(contains(b"abcdef", b"cde"));
        assert!(!contains(b"abc", b"abcd"));
        assert!(contains(b"abc", b""));
    }
}
