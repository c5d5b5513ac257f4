//! Store fixtures and helpers.
//!
//! Provides convenience functions for setting up test replicas and
//! comparing their contents.

use replidb_core::{Document, DocumentStore, StoreConfig};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A file-backed test replica with automatic cleanup.
pub struct TestReplica {
    /// The store instance.
    pub store: Arc<DocumentStore>,
    path: PathBuf,
    /// Kept alive to prevent cleanup.
    _temp_dir: TempDir,
}

impl TestReplica {
    /// Creates a file-backed replica with the given uid.
    pub fn file(replica_uid: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join(format!("{replica_uid}.replidb"));
        let store = DocumentStore::open_file(&path, StoreConfig::new().replica_uid(replica_uid))
            .expect("Failed to open file store");
        Self {
            store: Arc::new(store),
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the store and opens the file again.
    ///
    /// Panics if another handle to the store is still alive.
    pub fn reopen(&mut self) {
        let uid = self.store.replica_uid().to_string();
        let placeholder =
            Arc::new(DocumentStore::open_in_memory(&uid).expect("Failed to open placeholder"));
        let old = std::mem::replace(&mut self.store, placeholder);
        drop(Arc::into_inner(old).expect("Store is still shared"));
        let store = DocumentStore::open_file(&self.path, StoreConfig::new().replica_uid(uid))
            .expect("Failed to reopen file store");
        self.store = Arc::new(store);
    }
}

impl std::ops::Deref for TestReplica {
    type Target = DocumentStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Opens a shared in-memory store.
pub fn memory_store(replica_uid: &str) -> Arc<DocumentStore> {
    Arc::new(DocumentStore::open_in_memory(replica_uid).expect("Failed to open in-memory store"))
}

/// Opens two in-memory stores.
pub fn store_pair(a: &str, b: &str) -> (Arc<DocumentStore>, Arc<DocumentStore>) {
    (memory_store(a), memory_store(b))
}

/// Runs a test with a temporary in-memory store.
pub fn with_temp_store<F, R>(replica_uid: &str, f: F) -> R
where
    F: FnOnce(&DocumentStore) -> R,
{
    let store = memory_store(replica_uid);
    f(&store)
}

/// Returns `(doc_id, rev, content)` of every document, tombstones
/// included, ordered by id.
pub fn doc_contents(store: &DocumentStore) -> Vec<(String, String, Option<Value>)> {
    let (_, docs) = store.get_all_docs(true);
    docs.into_iter()
        .map(|doc| (doc.doc_id, doc.rev, doc.content))
        .collect()
}

/// Returns the sorted revisions stored as conflicts of `doc_id`, the
/// current one excluded.
pub fn conflict_revs(store: &DocumentStore, doc_id: &str) -> Vec<String> {
    let mut revs: Vec<String> = store
        .get_doc_conflicts(doc_id)
        .into_iter()
        .skip(1)
        .map(|doc| doc.rev)
        .collect();
    revs.sort();
    revs
}

/// Asserts that two replicas hold the same documents, revisions and
/// conflicts.
pub fn assert_converged(a: &DocumentStore, b: &DocumentStore) {
    let left = doc_contents(a);
    let right = doc_contents(b);
    assert_eq!(
        left,
        right,
        "{} and {} diverged",
        a.replica_uid(),
        b.replica_uid()
    );
    for (doc_id, _, _) in &left {
        assert_eq!(
            conflict_revs(a, doc_id),
            conflict_revs(b, doc_id),
            "conflicts of {doc_id} diverged"
        );
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store with `count` documents `doc-0`, `doc-1`, ...
    pub fn populated_store(replica_uid: &str, count: usize) -> Arc<DocumentStore> {
        let store = memory_store(replica_uid);
        for i in 0..count {
            store
                .create_doc_with_id(serde_json::json!({ "index": i }), &format!("doc-{i}"))
                .expect("Failed to create document");
        }
        store
    }

    /// Writes `content` as a new version of `doc_id`, creating it if needed.
    pub fn edit(store: &DocumentStore, doc_id: &str, content: Value) -> Document {
        let mut doc = store
            .get_doc(doc_id, true)
            .unwrap_or_else(|| Document::new(doc_id, "", None));
        doc.content = Some(content);
        store.put_doc(&mut doc).expect("Failed to put document");
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store() {
        with_temp_store("test", |store| {
            assert_eq!(store.replica_uid(), "test");
            assert_eq!(store.generation(), 0);
        });
    }

    #[test]
    fn test_file_replica_survives_reopen() {
        let mut replica = TestReplica::file("file");
        let doc = replica.create_doc(json!({"a": 1})).unwrap();
        assert!(replica.path().exists());

        replica.reopen();
        assert_eq!(replica.get_doc(&doc.doc_id, false), Some(doc));
        assert_eq!(replica.replica_uid(), "file");
    }

    #[test]
    fn test_populated_scenario() {
        let store = scenarios::populated_store("test", 3);
        let contents = doc_contents(&store);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].0, "doc-0");
        assert_eq!(contents[2].2, Some(json!({"index": 2})));
    }

    #[test]
    fn test_edit_creates_then_updates() {
        let store = memory_store("test");
        let first = scenarios::edit(&store, "doc", json!({"v": 1}));
        let second = scenarios::edit(&store, "doc", json!({"v": 2}));
        assert_eq!(first.rev, "test:1");
        assert_eq!(second.rev, "test:2");
        assert!(conflict_revs(&store, "doc").is_empty());
    }

    #[test]
    #[should_panic(expected = "diverged")]
    fn test_assert_converged_detects_difference() {
        let (a, b) = store_pair("a", "b");
        a.create_doc(json!({})).unwrap();
        assert_converged(&a, &b);
    }
}
