//! The target side of one exchange round.

use crate::error::{SyncError, SyncResult};
use crate::observer::{SyncObserver, SyncPhase};
use replidb_core::{
    Change, CoreError, Document, DocumentStore, Generation, PutState, SourceInfo,
};
use std::collections::HashMap;

/// A document with the sender's generation and transaction id at its
/// change.
pub type DocAtGen = (Document, Generation, String);

/// Runs one exchange round against `store`, acting as the sync target.
///
/// The pushed documents are applied in order, each with its source
/// provenance. Then every local change the source has not seen is handed
/// to `return_doc_cb` in ascending generation order, skipping documents
/// the source has just sent unless they changed again since. Finally, if
/// no local write raced the round, what the target now knows about the
/// source is recorded.
///
/// `observer` is called at each [`SyncPhase`]; an error from it aborts
/// the round.
///
/// Returns this store's generation and transaction id after the pushed
/// documents were applied.
///
/// # Errors
///
/// Returns an error if:
/// - `source_replica_uid` is this store's own uid (`InvalidReplicaUid`)
/// - the source's claimed knowledge of this store is not part of its
///   history (`InvalidGeneration` or `InvalidTransactionId`)
/// - a pushed document cannot be applied; the documents before it stay
///   applied
/// - `return_doc_cb` or the observer fails; sync state is not recorded
pub fn sync_exchange(
    store: &DocumentStore,
    docs_by_gen: &[DocAtGen],
    source_replica_uid: &str,
    last_known_generation: Generation,
    last_known_trans_id: &str,
    return_doc_cb: &mut dyn FnMut(Document, Generation, String) -> SyncResult<()>,
    observer: Option<&dyn SyncObserver>,
) -> SyncResult<(Generation, String)> {
    if source_replica_uid == store.replica_uid() {
        return Err(CoreError::invalid_replica_uid(source_replica_uid).into());
    }
    store.validate_gen_and_trans_id(last_known_generation, last_known_trans_id)?;

    let mut exchange = Exchange {
        store,
        source_replica_uid,
        observer,
        seen_ids: HashMap::new(),
        own_writes: 0,
    };

    exchange.phase(SyncPhase::BeforeWhatsChanged)?;
    let start_generation = store.generation();

    for (doc, generation, trans_id) in docs_by_gen {
        exchange.insert_doc_from_source(doc, *generation, trans_id)?;
    }

    let (new_generation, new_trans_id, changes) =
        exchange.find_changes_to_return(last_known_generation)?;
    exchange.return_docs(&changes, return_doc_cb)?;

    let current = store.generation();
    if current != start_generation + exchange.own_writes {
        tracing::warn!(
            source = source_replica_uid,
            start_generation,
            current,
            own_writes = exchange.own_writes,
            "local write raced the exchange, not recording sync info"
        );
    } else if let Some((_, generation, trans_id)) = docs_by_gen.last() {
        exchange.phase(SyncPhase::RecordSyncInfo)?;
        store.set_replica_gen_and_trans_id(source_replica_uid, *generation, trans_id)?;
    }

    tracing::debug!(
        source = source_replica_uid,
        received = docs_by_gen.len(),
        returned = changes.len(),
        new_generation,
        "exchange complete"
    );
    Ok((new_generation, new_trans_id))
}

struct Exchange<'a> {
    store: &'a DocumentStore,
    source_replica_uid: &'a str,
    observer: Option<&'a dyn SyncObserver>,
    /// Generation at which a pushed document became (or already was) the
    /// local version.
    seen_ids: HashMap<String, Generation>,
    own_writes: u64,
}

impl Exchange<'_> {
    fn phase(&self, phase: SyncPhase) -> SyncResult<()> {
        match self.observer {
            Some(observer) => observer.on_phase(phase),
            None => Ok(()),
        }
    }

    fn insert_doc_from_source(
        &mut self,
        doc: &Document,
        source_generation: Generation,
        source_trans_id: &str,
    ) -> SyncResult<()> {
        let source = SourceInfo::new(self.source_replica_uid, source_generation, source_trans_id);
        let outcome = self.store.put_doc_if_newer(doc, false, Some(&source))?;
        if outcome.written {
            self.own_writes += 1;
        }
        if outcome.state == PutState::Inserted || outcome.converged {
            self.seen_ids.insert(doc.doc_id.clone(), outcome.generation);
        }
        Ok(())
    }

    fn find_changes_to_return(
        &self,
        last_known_generation: Generation,
    ) -> SyncResult<(Generation, String, Vec<Change>)> {
        let changed = self.store.whats_changed(last_known_generation);
        self.phase(SyncPhase::AfterWhatsChanged)?;

        let changes = changed
            .changes
            .into_iter()
            .filter(|change| {
                self.seen_ids
                    .get(&change.doc_id)
                    .map_or(true, |&seen| change.generation > seen)
            })
            .collect();
        Ok((changed.generation, changed.trans_id, changes))
    }

    fn return_docs(
        &self,
        changes: &[Change],
        return_doc_cb: &mut dyn FnMut(Document, Generation, String) -> SyncResult<()>,
    ) -> SyncResult<()> {
        self.phase(SyncPhase::BeforeGetDocs)?;
        for change in changes {
            let doc = self.store.get_doc(&change.doc_id, true).ok_or_else(|| {
                SyncError::from(CoreError::document_does_not_exist(&change.doc_id))
            })?;
            return_doc_cb(doc, change.generation, change.trans_id.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::PhaseRecorder;
    use replidb_core::ReplicaGen;
    use serde_json::json;

    type Returned = Vec<(String, String, Option<String>, Generation)>;

    fn collect(
        returned: &mut Returned,
    ) -> impl FnMut(Document, Generation, String) -> SyncResult<()> + '_ {
        move |doc: Document, generation: Generation, _: String| {
            returned.push((doc.doc_id.clone(), doc.rev.clone(), doc.get_json(), generation));
            Ok(())
        }
    }

    #[test]
    fn returns_local_doc_to_new_source() {
        let store = DocumentStore::open_in_memory("replica1").unwrap();
        let doc = store.create_doc(json!({"a": 1})).unwrap();

        let mut returned = Returned::new();
        let (new_gen, new_trans_id) =
            sync_exchange(&store, &[], "other-replica", 0, "", &mut collect(&mut returned), None)
                .unwrap();

        assert_eq!(new_gen, 1);
        assert_eq!(new_trans_id, store.generation_info().1);
        assert_eq!(
            returned,
            vec![(doc.doc_id, doc.rev, Some(r#"{"a":1}"#.to_string()), 1)]
        );
    }

    #[test]
    fn pushed_docs_are_inserted_and_not_echoed() {
        let store = DocumentStore::open_in_memory("target").unwrap();
        let pushed = Document::new("doc", "source:1", Some(json!({"v": 1})));

        let mut returned = Returned::new();
        let (new_gen, _) = sync_exchange(
            &store,
            &[(pushed.clone(), 10, "T-sid".to_string())],
            "source",
            0,
            "",
            &mut collect(&mut returned),
            None,
        )
        .unwrap();

        assert_eq!(new_gen, 1);
        assert!(returned.is_empty());
        assert_eq!(store.get_doc("doc", false).unwrap().rev, "source:1");
        assert_eq!(
            store.get_replica_gen_and_trans_id("source"),
            ReplicaGen::new(10, "T-sid")
        );
    }

    #[test]
    fn converged_doc_is_not_returned() {
        let store = DocumentStore::open_in_memory("target").unwrap();
        let pushed = Document::new("doc", "source:1", Some(json!({})));
        store.put_doc_if_newer(&pushed, false, None).unwrap();

        let mut returned = Returned::new();
        sync_exchange(
            &store,
            &[(pushed, 1, "T-1".to_string())],
            "source",
            0,
            "",
            &mut collect(&mut returned),
            None,
        )
        .unwrap();
        assert!(returned.is_empty());
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn conflicting_push_returns_target_version() {
        let store = DocumentStore::open_in_memory("target").unwrap();
        store.create_doc_with_id(json!({"mine": true}), "doc").unwrap();
        let pushed = Document::new("doc", "source:1", Some(json!({"theirs": true})));

        let mut returned = Returned::new();
        sync_exchange(
            &store,
            &[(pushed, 1, "T-1".to_string())],
            "source",
            0,
            "",
            &mut collect(&mut returned),
            None,
        )
        .unwrap();

        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].1, "target:1");
        let local = store.get_doc("doc", false).unwrap();
        assert_eq!(local.rev, "target:1");
        assert!(!local.has_conflicts);
    }

    #[test]
    fn phases_in_order() {
        let store = DocumentStore::open_in_memory("target").unwrap();
        let recorder = PhaseRecorder::new();
        let pushed = Document::new("doc", "source:1", Some(json!({})));
        sync_exchange(
            &store,
            &[(pushed, 1, "T-1".to_string())],
            "source",
            0,
            "",
            &mut |_, _, _| Ok(()),
            Some(&recorder),
        )
        .unwrap();
        assert_eq!(
            recorder.names(),
            vec![
                "before whats_changed",
                "after whats_changed",
                "before get_docs",
                "record_sync_info"
            ]
        );
    }

    #[test]
    fn own_uid_is_rejected() {
        let store = DocumentStore::open_in_memory("target").unwrap();
        let result = sync_exchange(&store, &[], "target", 0, "", &mut |_, _, _| Ok(()), None);
        assert_eq!(
            result.unwrap_err().kind(),
            Some(replidb_sync_protocol::ErrorKind::InvalidReplicaUid)
        );
    }

    #[test]
    fn unknown_history_is_rejected() {
        let store = DocumentStore::open_in_memory("target").unwrap();
        store.create_doc(json!({})).unwrap();

        let err = sync_exchange(&store, &[], "source", 1, "T-bogus", &mut |_, _, _| Ok(()), None)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Database(CoreError::InvalidTransactionId { .. })
        ));

        let err = sync_exchange(&store, &[], "source", 5, "T-x", &mut |_, _, _| Ok(()), None)
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Database(CoreError::InvalidGeneration { .. })
        ));
    }

    #[test]
    fn failing_callback_skips_sync_info() {
        let store = DocumentStore::open_in_memory("target").unwrap();
        store.create_doc(json!({})).unwrap();
        let pushed = Document::new("pushed", "source:1", Some(json!({})));

        let result = sync_exchange(
            &store,
            &[(pushed, 3, "T-3".to_string())],
            "source",
            0,
            "",
            &mut |_, _, _| Err(SyncError::transport_retryable("disconnected")),
            None,
        );
        assert!(result.unwrap_err().is_retryable());
        // the pushed doc stays applied with its provenance
        assert!(store.get_doc("pushed", false).is_some());
        assert_eq!(
            store.get_replica_gen_and_trans_id("source"),
            ReplicaGen::new(3, "T-3")
        );
    }
}
