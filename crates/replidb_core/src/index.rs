//! Write observers and secondary indexes.
//!
//! A [`DocumentStore`](crate::DocumentStore) notifies registered
//! [`WriteObserver`]s after every committed mutation of a document's
//! current version. Secondary indexes are built purely on that hook; they
//! never intercept the write path.

use crate::document::Document;
use crate::store::DocumentStore;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Receives committed writes from a document store.
///
/// Callbacks run on the writing thread while the store's write lock is
/// held, so they observe writes in commit order. They must not write to
/// the store.
pub trait WriteObserver: Send + Sync {
    /// Called after `current` replaced `previous` as the current version.
    fn on_write(&self, previous: Option<&Document>, current: &Document);

    /// Called after the store was deleted.
    fn on_clear(&self) {}
}

#[derive(Debug, Default)]
struct IndexEntries {
    by_key: HashMap<Vec<String>, BTreeSet<String>>,
    key_of: HashMap<String, Vec<String>>,
}

/// An equality index over one or more JSON fields.
///
/// Field names may use dots to reach into nested objects (`"address.city"`).
/// A live document is indexed when every field resolves to a string,
/// number or boolean; tombstones and documents missing a field are not.
///
/// # Example
///
/// ```rust
/// use replidb_core::{DocumentStore, FieldIndex};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let store = DocumentStore::open_in_memory("replica").unwrap();
/// let index = Arc::new(FieldIndex::new("by-key", ["key"]));
/// store.register_observer(index.clone());
///
/// let doc = store.create_doc(json!({"key": "value"})).unwrap();
/// assert_eq!(index.get_from_index(&["value"]), vec![doc.doc_id]);
/// ```
#[derive(Debug)]
pub struct FieldIndex {
    name: String,
    fields: Vec<String>,
    entries: RwLock<IndexEntries>,
}

impl FieldIndex {
    /// Creates an empty index over `fields`.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            entries: RwLock::new(IndexEntries::default()),
        }
    }

    /// Returns the index name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the indexed fields.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the ids of live documents whose fields equal `values`, in
    /// id order.
    #[must_use]
    pub fn get_from_index(&self, values: &[&str]) -> Vec<String> {
        let key: Vec<String> = values.iter().map(|v| (*v).to_string()).collect();
        self.entries
            .read()
            .by_key
            .get(&key)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().key_of.len()
    }

    /// Returns true if no document is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces the index contents with the current documents of `store`.
    pub fn rebuild(&self, store: &DocumentStore) {
        let (_, docs) = store.get_all_docs(false);
        let mut entries = self.entries.write();
        *entries = IndexEntries::default();
        for doc in &docs {
            self.insert(&mut entries, doc);
        }
    }

    fn extract_key(&self, doc: &Document) -> Option<Vec<String>> {
        let content = doc.content.as_ref()?;
        self.fields
            .iter()
            .map(|field| {
                let value = field
                    .split('.')
                    .try_fold(content, |value, part| value.get(part))?;
                match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                }
            })
            .collect()
    }

    fn remove(entries: &mut IndexEntries, doc_id: &str) {
        if let Some(key) = entries.key_of.remove(doc_id) {
            if let Some(ids) = entries.by_key.get_mut(&key) {
                ids.remove(doc_id);
                if ids.is_empty() {
                    entries.by_key.remove(&key);
                }
            }
        }
    }

    fn insert(&self, entries: &mut IndexEntries, doc: &Document) {
        Self::remove(entries, &doc.doc_id);
        if let Some(key) = self.extract_key(doc) {
            entries
                .by_key
                .entry(key.clone())
                .or_default()
                .insert(doc.doc_id.clone());
            entries.key_of.insert(doc.doc_id.clone(), key);
        }
    }
}

impl WriteObserver for FieldIndex {
    fn on_write(&self, _previous: Option<&Document>, current: &Document) {
        let mut entries = self.entries.write();
        self.insert(&mut entries, current);
    }

    fn on_clear(&self) {
        *self.entries.write() = IndexEntries::default();
    }
}
