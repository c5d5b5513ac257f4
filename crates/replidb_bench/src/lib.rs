//! Benchmark utilities.

#![warn(missing_docs)]

use rand::Rng;
use replidb_core::{Document, DocumentStore};
use serde_json::{json, Value};

/// Generates a document body with a random payload of `size` characters.
pub fn random_content(size: usize) -> Value {
    let mut rng = rand::thread_rng();
    let payload: String = (0..size)
        .map(|_| char::from(b'a' + rng.gen_range(0..26)))
        .collect();
    json!({ "payload": payload, "n": rng.gen::<u32>() })
}

/// Generates `count` documents with revisions from `origin`, as if
/// received from that replica.
pub fn remote_docs(origin: &str, count: usize, payload_size: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            Document::new(
                format!("doc-{i}"),
                format!("{origin}:1"),
                Some(random_content(payload_size)),
            )
        })
        .collect()
}

/// Opens an in-memory store holding `count` documents.
pub fn populated_store(replica_uid: &str, count: usize, payload_size: usize) -> DocumentStore {
    let store = DocumentStore::open_in_memory(replica_uid).expect("open store");
    for i in 0..count {
        store
            .create_doc_with_id(random_content(payload_size), &format!("doc-{i}"))
            .expect("create document");
    }
    store
}
