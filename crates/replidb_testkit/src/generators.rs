//! Property-based test generators using proptest.
//!
//! Provides strategies for generating documents, revisions and sequences
//! of local edits that respect the store's input rules.

use proptest::prelude::*;
use replidb_core::{DocumentStore, VectorClock};
use serde_json::{json, Value};

/// Strategy for generating acceptable document ids.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9._%-]{0,15}").expect("Invalid regex")
}

/// Strategy for generating replica uids.
pub fn replica_uid_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,11}").expect("Invalid regex")
}

/// Strategy for generating small JSON objects.
pub fn content_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ];
    prop::collection::btree_map("[a-z]{1,6}", leaf, 0..5)
        .prop_map(|fields| Value::Object(fields.into_iter().collect()))
}

/// Strategy for generating vector clocks over a few replicas.
pub fn vector_clock_strategy() -> impl Strategy<Value = VectorClock> {
    prop::collection::btree_map("[a-d]", 1u64..20, 0..4).prop_map(|counters| {
        let mut clock = VectorClock::new();
        for (origin, counter) in counters {
            for _ in 0..counter {
                clock.increment(&origin);
            }
        }
        clock
    })
}

/// A local edit applied by [`apply_edit`].
#[derive(Debug, Clone)]
pub enum Edit {
    /// Creates or overwrites a document.
    Put {
        /// Target document.
        doc_id: String,
        /// New content.
        content: Value,
    },
    /// Deletes a document if it is live.
    Delete {
        /// Target document.
        doc_id: String,
    },
}

/// Strategy for generating edits over a small id space, so that replicas
/// editing independently collide often.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    let doc_id = (0u8..4).prop_map(|n| format!("doc-{n}"));
    prop_oneof![
        3 => (doc_id.clone(), content_strategy())
            .prop_map(|(doc_id, content)| Edit::Put { doc_id, content }),
        1 => doc_id.prop_map(|doc_id| Edit::Delete { doc_id }),
    ]
}

/// Strategy for generating a sequence of edits.
pub fn edit_sequence_strategy(
    min_edits: usize,
    max_edits: usize,
) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(), min_edits..max_edits)
}

/// Applies `edit` to `store` on top of whatever version is current.
///
/// Conflicted documents are first resolved in favour of the current
/// version. Deleting a missing or deleted document does nothing.
pub fn apply_edit(store: &DocumentStore, edit: &Edit) {
    let doc_id = match edit {
        Edit::Put { doc_id, .. } | Edit::Delete { doc_id } => doc_id,
    };
    let conflicts = store.get_doc_conflicts(doc_id);
    if !conflicts.is_empty() {
        let mut winner = conflicts[0].clone();
        let revs: Vec<String> = conflicts.iter().map(|doc| doc.rev.clone()).collect();
        store
            .resolve_doc(&mut winner, &revs)
            .expect("Failed to resolve conflict");
    }

    match edit {
        Edit::Put { doc_id, content } => {
            let mut doc = store
                .get_doc(doc_id, true)
                .unwrap_or_else(|| replidb_core::Document::new(doc_id.as_str(), "", None));
            doc.content = Some(content.clone());
            store.put_doc(&mut doc).expect("Failed to put document");
        }
        Edit::Delete { doc_id } => {
            if let Some(mut doc) = store.get_doc(doc_id, false) {
                store.delete_doc(&mut doc).expect("Failed to delete document");
            }
        }
    }
}

/// Returns a fixed sample document body.
pub fn sample_content(n: usize) -> Value {
    json!({ "n": n, "name": format!("doc {n}"), "tags": ["a", "b"] })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
