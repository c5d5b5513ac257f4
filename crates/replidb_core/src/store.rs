//! Document store facade and replay.

use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::index::WriteObserver;
use crate::log::{ConflictRecord, LogRecord, LogWriter, SourceRecord};
use crate::revision::{RevisionOrdering, VectorClock};
use crate::sync_state::SyncStateTracker;
use crate::types::{
    new_doc_id, new_replica_uid, new_trans_id, Change, Generation, PutOutcome, PutState,
    ReplicaGen, SourceInfo, TransactionLogEntry, WhatsChanged,
};
use parking_lot::{Mutex, RwLock};
use replidb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// A conflicting version of a document.
#[derive(Debug, Clone, PartialEq)]
struct Conflict {
    rev: String,
    content: Option<Value>,
}

/// Stored state of one document.
#[derive(Debug, Clone, PartialEq)]
struct DocRecord {
    rev: String,
    content: Option<Value>,
    conflicts: Vec<Conflict>,
}

impl DocRecord {
    fn to_document(&self, doc_id: &str) -> Document {
        Document {
            doc_id: doc_id.to_string(),
            rev: self.rev.clone(),
            content: self.content.clone(),
            has_conflicts: !self.conflicts.is_empty(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    docs: HashMap<String, DocRecord>,
    transaction_log: Vec<TransactionLogEntry>,
    tracker: SyncStateTracker,
}

impl StoreState {
    fn generation(&self) -> Generation {
        self.transaction_log.len() as Generation
    }

    fn last_trans_id(&self) -> String {
        self.transaction_log
            .last()
            .map(|entry| entry.trans_id.clone())
            .unwrap_or_default()
    }
}

/// The document store of one replica.
///
/// `DocumentStore` keeps the current version of every document, its
/// conflict set, the append-only transaction log and the sync state
/// tracker. All of it is persisted as records in a
/// [`StorageBackend`] injected at construction and rebuilt by replay when
/// the store is opened.
///
/// # Concurrency
///
/// Every mutation (local writes, synced writes, tracker writes) runs under
/// a single store-wide write lock, so the writes to one document are
/// strictly ordered and each commit is one log record. Readers take a
/// snapshot of the in-memory state and never wait on storage I/O.
///
/// # Example
///
/// ```rust
/// use replidb_core::DocumentStore;
/// use serde_json::json;
///
/// let store = DocumentStore::open_in_memory("replica-a").unwrap();
/// let mut doc = store.create_doc(json!({"a": 1})).unwrap();
/// assert_eq!(doc.rev, "replica-a:1");
///
/// doc.set_json(r#"{"a": 2}"#).unwrap();
/// store.put_doc(&mut doc).unwrap();
/// assert_eq!(doc.rev, "replica-a:2");
/// assert_eq!(store.generation(), 2);
/// ```
pub struct DocumentStore {
    replica_uid: String,
    log: LogWriter,
    state: RwLock<StoreState>,
    write_lock: Mutex<()>,
    observers: RwLock<Vec<Arc<dyn WriteObserver>>>,
    is_open: RwLock<bool>,
}

impl DocumentStore {
    /// Opens a store over a storage backend, replaying its records.
    ///
    /// A store opened on an empty backend records its replica uid (the
    /// configured one, or a freshly minted one).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a record cannot be read or decoded
    /// - the configured replica uid differs from the stored one
    ///   (`InvalidReplicaUid`)
    pub fn open(backend: Box<dyn StorageBackend>, config: StoreConfig) -> CoreResult<Self> {
        let log = LogWriter::new(backend, config.sync_on_write);
        let (stored_uid, state) = Self::replay(&log)?;

        let replica_uid = match (stored_uid, config.replica_uid) {
            (Some(stored), Some(wanted)) if stored != wanted => {
                return Err(CoreError::invalid_replica_uid(wanted));
            }
            (Some(stored), _) => stored,
            (None, wanted) => {
                if !state.transaction_log.is_empty() {
                    return Err(CoreError::log_corruption(
                        "mutations recorded without a replica identity",
                    ));
                }
                let uid = wanted.unwrap_or_else(new_replica_uid);
                log.append(&LogRecord::Identity {
                    replica_uid: uid.clone(),
                })?;
                uid
            }
        };

        tracing::debug!(
            replica_uid = %replica_uid,
            generation = state.generation(),
            docs = state.docs.len(),
            "opened document store"
        );

        Ok(Self {
            replica_uid,
            log,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
            observers: RwLock::new(Vec::new()),
            is_open: RwLock::new(true),
        })
    }

    /// Opens a store persisted in a single file.
    ///
    /// # Errors
    ///
    /// Returns a `NotProvisioned` storage error when the file is missing and
    /// `create_if_missing` is false, plus any error of [`Self::open`].
    pub fn open_file(path: &Path, config: StoreConfig) -> CoreResult<Self> {
        let backend = FileBackend::open(path, config.create_if_missing)?;
        Self::open(Box::new(backend), config)
    }

    /// Opens a fresh in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity record cannot be written.
    pub fn open_in_memory(replica_uid: &str) -> CoreResult<Self> {
        Self::open(
            Box::new(InMemoryBackend::new()),
            StoreConfig::new()
                .replica_uid(replica_uid)
                .sync_on_write(false),
        )
    }

    /// Copies this replica into a new in-memory store with the same
    /// identity, history and sync state.
    ///
    /// Writes to the copy never reach the original. This models restoring
    /// a replica from a backup.
    ///
    /// # Errors
    ///
    /// Returns an error if the records cannot be read or replayed.
    pub fn duplicate(&self) -> CoreResult<Self> {
        let _guard = self.write_lock.lock();
        let records = self.log.raw_records()?;
        Self::open(
            Box::new(InMemoryBackend::with_records(records)),
            StoreConfig::new().sync_on_write(false),
        )
    }

    fn replay(log: &LogWriter) -> CoreResult<(Option<String>, StoreState)> {
        let mut replica_uid = None;
        let mut state = StoreState::default();

        for record in log.read_all()? {
            match record {
                LogRecord::Identity { replica_uid: uid } => {
                    if replica_uid.is_some() {
                        return Err(CoreError::log_corruption("duplicate identity record"));
                    }
                    replica_uid = Some(uid);
                }
                LogRecord::Mutation {
                    doc_id,
                    trans_id,
                    revision,
                    content,
                    conflicts,
                    source,
                } => {
                    let record = DocRecord {
                        rev: revision,
                        content: decode_content(content.as_deref())?,
                        conflicts: decode_conflicts(conflicts)?,
                    };
                    state.docs.insert(doc_id.clone(), record);
                    state
                        .transaction_log
                        .push(TransactionLogEntry { doc_id, trans_id });
                    if let Some(source) = source {
                        state.tracker.set(
                            &source.replica_uid,
                            ReplicaGen::new(source.generation, source.trans_id),
                        );
                    }
                }
                LogRecord::Conflicts { doc_id, conflicts } => {
                    let doc = state.docs.get_mut(&doc_id).ok_or_else(|| {
                        CoreError::log_corruption(format!(
                            "conflict record for unknown document {doc_id}"
                        ))
                    })?;
                    doc.conflicts = decode_conflicts(conflicts)?;
                }
                LogRecord::ReplicaGen {
                    replica_uid: other,
                    generation,
                    trans_id,
                } => {
                    state.tracker.set(&other, ReplicaGen::new(generation, trans_id));
                }
            }
        }

        Ok((replica_uid, state))
    }

    /// Returns this replica's uid.
    #[must_use]
    pub fn replica_uid(&self) -> &str {
        &self.replica_uid
    }

    /// Registers an observer notified after every committed mutation.
    pub fn register_observer(&self, observer: Arc<dyn WriteObserver>) {
        self.observers.write().push(observer);
    }

    // ------------------------------------------------------------------
    // Local writes
    // ------------------------------------------------------------------

    /// Creates a document with a minted id.
    ///
    /// # Errors
    ///
    /// Returns an error if the mutation cannot be persisted.
    pub fn create_doc(&self, content: Value) -> CoreResult<Document> {
        self.create_doc_with_id(content, &new_doc_id())
    }

    /// Creates a document with the given id.
    ///
    /// Creating over a tombstone continues that document's revision chain.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the id is not acceptable (`InvalidDocId`)
    /// - a live document with this id exists (`RevisionConflict`)
    /// - the tombstone has unresolved conflicts (`ConflictedDoc`)
    pub fn create_doc_with_id(&self, content: Value, doc_id: &str) -> CoreResult<Document> {
        validate_doc_id(doc_id)?;
        let _guard = self.write_lock.lock();
        self.ensure_open()?;

        let mut rev = match self.current(doc_id) {
            Some(existing) if existing.content.is_some() => {
                return Err(CoreError::revision_conflict(doc_id));
            }
            Some(existing) if !existing.conflicts.is_empty() => {
                return Err(CoreError::ConflictedDoc {
                    doc_id: doc_id.to_string(),
                });
            }
            Some(existing) => VectorClock::parse(&existing.rev)?,
            None => VectorClock::new(),
        };
        rev.increment(&self.replica_uid);

        let record = DocRecord {
            rev: rev.to_string(),
            content: Some(content),
            conflicts: Vec::new(),
        };
        self.commit_mutation(doc_id, &record, None)?;
        tracing::debug!(doc_id, rev = %record.rev, "created document");
        Ok(record.to_document(doc_id))
    }

    /// Writes a new version of a document.
    ///
    /// `doc.rev` must be the revision the caller last read: the store's
    /// current revision must be equal to it or an ancestor of it. An empty
    /// `doc.rev` creates the document (or recreates a tombstone). On success
    /// `doc.rev` is updated to the new revision, which is also returned.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the base revision is stale (`RevisionConflict`)
    /// - the document has unresolved conflicts (`ConflictedDoc`)
    /// - the mutation cannot be persisted
    pub fn put_doc(&self, doc: &mut Document) -> CoreResult<String> {
        validate_doc_id(&doc.doc_id)?;
        let _guard = self.write_lock.lock();
        self.ensure_open()?;

        let current = self.current(&doc.doc_id);
        let base = self.writable_base(&doc.doc_id, &doc.rev, current.as_ref(), true)?;
        let mut rev = base;
        rev.increment(&self.replica_uid);

        let record = DocRecord {
            rev: rev.to_string(),
            content: doc.content.clone(),
            conflicts: Vec::new(),
        };
        self.commit_mutation(&doc.doc_id, &record, None)?;
        tracing::debug!(doc_id = %doc.doc_id, rev = %record.rev, "put document");

        doc.rev = record.rev.clone();
        doc.has_conflicts = false;
        Ok(record.rev)
    }

    /// Deletes a document, leaving a tombstone.
    ///
    /// Follows the same optimistic concurrency contract as
    /// [`Self::put_doc`]. On success `doc` becomes the tombstone.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the document does not exist (`DocumentDoesNotExist`)
    /// - it is already deleted (`DocumentAlreadyDeleted`)
    /// - the base revision is stale (`RevisionConflict`)
    /// - the document has unresolved conflicts (`ConflictedDoc`)
    pub fn delete_doc(&self, doc: &mut Document) -> CoreResult<String> {
        let _guard = self.write_lock.lock();
        self.ensure_open()?;

        let current = self
            .current(&doc.doc_id)
            .ok_or_else(|| CoreError::document_does_not_exist(&doc.doc_id))?;
        if current.content.is_none() {
            return Err(CoreError::DocumentAlreadyDeleted {
                doc_id: doc.doc_id.clone(),
            });
        }
        let mut rev = self.writable_base(&doc.doc_id, &doc.rev, Some(&current), false)?;
        rev.increment(&self.replica_uid);

        let record = DocRecord {
            rev: rev.to_string(),
            content: None,
            conflicts: Vec::new(),
        };
        self.commit_mutation(&doc.doc_id, &record, None)?;
        tracing::debug!(doc_id = %doc.doc_id, rev = %record.rev, "deleted document");

        doc.rev = record.rev.clone();
        doc.content = None;
        doc.has_conflicts = false;
        Ok(record.rev)
    }

    /// Resolves conflicts by superseding `conflicted_revs` with `doc`.
    ///
    /// The new revision is the element-wise maximum of the superseded
    /// revisions with this replica's counter incremented. Conflicts named in
    /// `conflicted_revs` are removed; the others remain. If the current
    /// revision is superseded, `doc` becomes the current version; otherwise
    /// the resolution joins the conflict set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the document does not exist (`DocumentDoesNotExist`)
    /// - `conflicted_revs` is empty or names a revision that is neither the
    ///   current one nor a conflict (`RevisionConflict`)
    /// - the change cannot be persisted
    pub fn resolve_doc(&self, doc: &mut Document, conflicted_revs: &[String]) -> CoreResult<String> {
        let _guard = self.write_lock.lock();
        self.ensure_open()?;

        let current = self
            .current(&doc.doc_id)
            .ok_or_else(|| CoreError::document_does_not_exist(&doc.doc_id))?;

        // Only versions the store holds can be superseded; anything else
        // would yield a revision that resolves nothing
        let known =
            |rev: &str| current.rev == rev || current.conflicts.iter().any(|c| c.rev == rev);
        if conflicted_revs.is_empty() || !conflicted_revs.iter().all(|rev| known(rev)) {
            return Err(CoreError::revision_conflict(&doc.doc_id));
        }

        let mut rev = VectorClock::new();
        for superseded in conflicted_revs {
            rev.maximize(&VectorClock::parse(superseded)?);
        }
        rev.increment(&self.replica_uid);
        let new_rev = rev.to_string();

        let superseded: HashSet<&str> = conflicted_revs.iter().map(String::as_str).collect();
        let mut conflicts: Vec<Conflict> = current
            .conflicts
            .iter()
            .filter(|c| !superseded.contains(c.rev.as_str()))
            .cloned()
            .collect();

        if superseded.contains(current.rev.as_str()) {
            let record = DocRecord {
                rev: new_rev.clone(),
                content: doc.content.clone(),
                conflicts,
            };
            self.commit_mutation(&doc.doc_id, &record, None)?;
            doc.has_conflicts = !record.conflicts.is_empty();
        } else {
            conflicts.push(Conflict {
                rev: new_rev.clone(),
                content: doc.content.clone(),
            });
            self.commit_conflicts(&doc.doc_id, &conflicts)?;
            doc.has_conflicts = true;
        }
        tracing::debug!(
            doc_id = %doc.doc_id,
            rev = %new_rev,
            superseded = conflicted_revs.len(),
            "resolved document"
        );

        doc.rev = new_rev.clone();
        Ok(new_rev)
    }

    /// Checks `base_rev` against the current version and returns the clock a
    /// new revision is derived from.
    fn writable_base(
        &self,
        doc_id: &str,
        base_rev: &str,
        current: Option<&DocRecord>,
        allow_recreate: bool,
    ) -> CoreResult<VectorClock> {
        let Some(current) = current else {
            if base_rev.is_empty() {
                return Ok(VectorClock::new());
            }
            return Err(CoreError::revision_conflict(doc_id));
        };
        if !current.conflicts.is_empty() {
            return Err(CoreError::ConflictedDoc {
                doc_id: doc_id.to_string(),
            });
        }
        let current_rev = VectorClock::parse(&current.rev)?;
        if allow_recreate && base_rev.is_empty() && current.content.is_none() {
            return Ok(current_rev);
        }
        // The new revision descends from what is stored, never from
        // counters only the caller claims to have seen
        match VectorClock::parse(base_rev)?.compare(&current_rev) {
            RevisionOrdering::Same | RevisionOrdering::Newer => Ok(current_rev),
            RevisionOrdering::Older | RevisionOrdering::Conflicted => {
                Err(CoreError::revision_conflict(doc_id))
            }
        }
    }

    // ------------------------------------------------------------------
    // Synced writes
    // ------------------------------------------------------------------

    /// Applies a document received from another replica.
    ///
    /// | incoming vs local | result |
    /// |-------------------|--------|
    /// | no local doc, or newer | stored, `Inserted` (`Autoresolved` if pruning a same-content conflict bumped the revision) |
    /// | same or older | nothing written, `Superseded` |
    /// | concurrent, same content | revisions merged, `Autoresolved` |
    /// | concurrent | `Conflicted`; with `save_conflict` the incoming version becomes current and the local one joins the conflict set |
    ///
    /// Whenever a revision is stored, conflict members it dominates, or
    /// that carry the same content, are pruned.
    ///
    /// `source` is validated against the sync state tracker before anything
    /// is written and recorded afterwards, in the same log record as the
    /// mutation when there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `source` names this replica (`InvalidReplicaUid`)
    /// - `source` moved backwards (`InvalidGeneration`) or diverged
    ///   (`InvalidTransactionId`)
    /// - the revision does not parse, or the write cannot be persisted
    pub fn put_doc_if_newer(
        &self,
        doc: &Document,
        save_conflict: bool,
        source: Option<&SourceInfo>,
    ) -> CoreResult<PutOutcome> {
        validate_doc_id(&doc.doc_id)?;
        if let Some(source) = source {
            if source.replica_uid == self.replica_uid {
                return Err(CoreError::invalid_replica_uid(&source.replica_uid));
            }
        }
        let incoming = VectorClock::parse(&doc.rev)?;

        let _guard = self.write_lock.lock();
        self.ensure_open()?;

        if let Some(source) = source {
            self.state.read().tracker.validate(
                &source.replica_uid,
                source.generation,
                &source.trans_id,
            )?;
        }

        let current = self.current(&doc.doc_id);
        let ordering = match &current {
            Some(record) => incoming.compare(&VectorClock::parse(&record.rev)?),
            None => RevisionOrdering::Newer,
        };

        let (state, written, converged) = match (ordering, current) {
            (RevisionOrdering::Newer, current) => {
                let mut record = DocRecord {
                    rev: doc.rev.clone(),
                    content: doc.content.clone(),
                    conflicts: current.map(|c| c.conflicts).unwrap_or_default(),
                };
                let autoresolved = self.prune_conflicts(&mut record)?;
                self.commit_mutation(&doc.doc_id, &record, source)?;
                let state = if autoresolved {
                    PutState::Autoresolved
                } else {
                    PutState::Inserted
                };
                (state, true, false)
            }
            (RevisionOrdering::Same, _) => (PutState::Superseded, false, true),
            (RevisionOrdering::Older, _) => (PutState::Superseded, false, false),
            (RevisionOrdering::Conflicted, Some(local)) => {
                if local.content == doc.content {
                    let mut merged = incoming;
                    merged.maximize(&VectorClock::parse(&local.rev)?);
                    merged.increment(&self.replica_uid);
                    let mut record = DocRecord {
                        rev: merged.to_string(),
                        content: local.content,
                        conflicts: local.conflicts,
                    };
                    self.prune_conflicts(&mut record)?;
                    self.commit_mutation(&doc.doc_id, &record, source)?;
                    (PutState::Autoresolved, true, false)
                } else if save_conflict {
                    let mut record = DocRecord {
                        rev: doc.rev.clone(),
                        content: doc.content.clone(),
                        conflicts: local.conflicts,
                    };
                    self.prune_conflicts(&mut record)?;
                    record.conflicts.push(Conflict {
                        rev: local.rev,
                        content: local.content,
                    });
                    self.commit_mutation(&doc.doc_id, &record, source)?;
                    (PutState::Conflicted, true, false)
                } else {
                    (PutState::Conflicted, false, false)
                }
            }
            (RevisionOrdering::Conflicted, None) => {
                return Err(CoreError::log_corruption(
                    "concurrent revision without a local document",
                ));
            }
        };

        if !written {
            if let Some(source) = source {
                self.record_source(source)?;
            }
        }

        let generation = self.generation();
        tracing::debug!(
            doc_id = %doc.doc_id,
            rev = %doc.rev,
            state = %state,
            generation,
            "applied synced document"
        );
        Ok(PutOutcome {
            state,
            generation,
            written,
            converged,
        })
    }

    /// Drops conflict members that `record` dominates and merges in those
    /// with the same content. Returns true if the revision was bumped.
    fn prune_conflicts(&self, record: &mut DocRecord) -> CoreResult<bool> {
        if record.conflicts.is_empty() {
            return Ok(false);
        }
        let mut rev = VectorClock::parse(&record.rev)?;
        let mut autoresolved = false;
        let mut kept = Vec::with_capacity(record.conflicts.len());

        for conflict in record.conflicts.drain(..) {
            let conflict_rev = VectorClock::parse(&conflict.rev)?;
            if rev.is_newer(&conflict_rev) {
                continue;
            }
            if conflict.content == record.content {
                rev.maximize(&conflict_rev);
                autoresolved = true;
                continue;
            }
            kept.push(conflict);
        }

        if autoresolved {
            rev.increment(&self.replica_uid);
            record.rev = rev.to_string();
        }
        record.conflicts = kept;
        Ok(autoresolved)
    }

    /// Records provenance of a synced document that caused no mutation.
    fn record_source(&self, source: &SourceInfo) -> CoreResult<()> {
        let known = ReplicaGen::new(source.generation, source.trans_id.clone());
        if self.state.read().tracker.get(&source.replica_uid) == known {
            return Ok(());
        }
        self.log.append(&LogRecord::ReplicaGen {
            replica_uid: source.replica_uid.clone(),
            generation: source.generation,
            trans_id: source.trans_id.clone(),
        })?;
        self.state.write().tracker.set(&source.replica_uid, known);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Persists a new version of a document as one transaction log entry and
    /// notifies observers. Must be called with the write lock held.
    fn commit_mutation(
        &self,
        doc_id: &str,
        record: &DocRecord,
        source: Option<&SourceInfo>,
    ) -> CoreResult<Generation> {
        let trans_id = new_trans_id();
        self.log.append(&LogRecord::Mutation {
            doc_id: doc_id.to_string(),
            trans_id: trans_id.clone(),
            revision: record.rev.clone(),
            content: encode_content(record.content.as_ref())?,
            conflicts: encode_conflicts(&record.conflicts)?,
            source: source.map(SourceRecord::from),
        })?;

        let (previous, generation) = {
            let mut state = self.state.write();
            let previous = state
                .docs
                .insert(doc_id.to_string(), record.clone())
                .map(|old| old.to_document(doc_id));
            state.transaction_log.push(TransactionLogEntry {
                doc_id: doc_id.to_string(),
                trans_id,
            });
            if let Some(source) = source {
                state.tracker.set(
                    &source.replica_uid,
                    ReplicaGen::new(source.generation, source.trans_id.clone()),
                );
            }
            (previous, state.generation())
        };

        let current = record.to_document(doc_id);
        for observer in self.observers.read().iter() {
            observer.on_write(previous.as_ref(), &current);
        }
        Ok(generation)
    }

    /// Persists a new conflict set while the current version stays.
    fn commit_conflicts(&self, doc_id: &str, conflicts: &[Conflict]) -> CoreResult<()> {
        self.log.append(&LogRecord::Conflicts {
            doc_id: doc_id.to_string(),
            conflicts: encode_conflicts(conflicts)?,
        })?;
        if let Some(doc) = self.state.write().docs.get_mut(doc_id) {
            doc.conflicts = conflicts.to_vec();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    fn current(&self, doc_id: &str) -> Option<DocRecord> {
        self.state.read().docs.get(doc_id).cloned()
    }

    /// Returns the current version of a document.
    ///
    /// Tombstones are returned only with `include_deleted`.
    #[must_use]
    pub fn get_doc(&self, doc_id: &str, include_deleted: bool) -> Option<Document> {
        let state = self.state.read();
        let record = state.docs.get(doc_id)?;
        if record.content.is_none() && !include_deleted {
            return None;
        }
        Some(record.to_document(doc_id))
    }

    /// Returns the current versions of several documents, in the order
    /// requested. Unknown ids are skipped.
    #[must_use]
    pub fn get_docs(&self, doc_ids: &[String], include_deleted: bool) -> Vec<Document> {
        let state = self.state.read();
        doc_ids
            .iter()
            .filter_map(|doc_id| {
                let record = state.docs.get(doc_id)?;
                (include_deleted || record.content.is_some())
                    .then(|| record.to_document(doc_id))
            })
            .collect()
    }

    /// Returns the generation and every document, ordered by id.
    #[must_use]
    pub fn get_all_docs(&self, include_deleted: bool) -> (Generation, Vec<Document>) {
        let state = self.state.read();
        let mut docs: Vec<Document> = state
            .docs
            .iter()
            .filter(|(_, record)| include_deleted || record.content.is_some())
            .map(|(doc_id, record)| record.to_document(doc_id))
            .collect();
        docs.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        (state.generation(), docs)
    }

    /// Returns the conflicted versions of a document: the current version
    /// first, then every conflict member in the order they were added.
    /// Empty if the document has no conflicts.
    #[must_use]
    pub fn get_doc_conflicts(&self, doc_id: &str) -> Vec<Document> {
        let state = self.state.read();
        let Some(record) = state.docs.get(doc_id) else {
            return Vec::new();
        };
        if record.conflicts.is_empty() {
            return Vec::new();
        }
        let mut docs = vec![record.to_document(doc_id)];
        docs.extend(
            record
                .conflicts
                .iter()
                .map(|c| Document::new(doc_id, c.rev.clone(), c.content.clone())),
        );
        docs
    }

    /// Returns the whole transaction log in mutation order.
    #[must_use]
    pub fn get_transaction_log(&self) -> Vec<TransactionLogEntry> {
        self.state.read().transaction_log.clone()
    }

    /// Returns the number of mutations ever applied.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.state.read().generation()
    }

    /// Returns the generation and the transaction id at it.
    #[must_use]
    pub fn generation_info(&self) -> (Generation, String) {
        let state = self.state.read();
        (state.generation(), state.last_trans_id())
    }

    /// Returns the transaction id at `generation` (empty for 0).
    ///
    /// # Errors
    ///
    /// Returns `InvalidGeneration` if `generation` is beyond the current one.
    pub fn get_trans_id_for_gen(&self, generation: Generation) -> CoreResult<String> {
        let state = self.state.read();
        if generation == 0 {
            return Ok(String::new());
        }
        let current = state.generation();
        if generation > current {
            return Err(CoreError::InvalidGeneration {
                generation,
                known: current,
            });
        }
        let index = usize::try_from(generation - 1)
            .map_err(|_| CoreError::InvalidGeneration {
                generation,
                known: current,
            })?;
        Ok(state.transaction_log[index].trans_id.clone())
    }

    /// Checks that `(generation, trans_id)` is a point of this replica's
    /// history. Generation 0 is always valid.
    ///
    /// # Errors
    ///
    /// Returns `InvalidGeneration` if the generation does not exist yet,
    /// `InvalidTransactionId` if the history at it differs.
    pub fn validate_gen_and_trans_id(&self, generation: Generation, trans_id: &str) -> CoreResult<()> {
        if generation == 0 {
            return Ok(());
        }
        let expected = self.get_trans_id_for_gen(generation)?;
        if expected != trans_id {
            return Err(CoreError::InvalidTransactionId {
                generation,
                expected,
                actual: trans_id.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the latest change of every document mutated after
    /// `since_generation`, ordered by generation.
    #[must_use]
    pub fn whats_changed(&self, since_generation: Generation) -> WhatsChanged {
        let state = self.state.read();
        let start = usize::try_from(since_generation)
            .unwrap_or(usize::MAX)
            .min(state.transaction_log.len());

        let mut latest: HashMap<&str, Change> = HashMap::new();
        for (offset, entry) in state.transaction_log[start..].iter().enumerate() {
            latest.insert(
                &entry.doc_id,
                Change {
                    doc_id: entry.doc_id.clone(),
                    generation: (start + offset + 1) as Generation,
                    trans_id: entry.trans_id.clone(),
                },
            );
        }
        let mut changes: Vec<Change> = latest.into_values().collect();
        changes.sort_by_key(|change| change.generation);

        WhatsChanged {
            generation: state.generation(),
            trans_id: state.last_trans_id(),
            changes,
        }
    }

    // ------------------------------------------------------------------
    // Sync state
    // ------------------------------------------------------------------

    /// Returns what this replica knows about another one, `(0, "")` if
    /// nothing.
    #[must_use]
    pub fn get_replica_gen_and_trans_id(&self, other_replica_uid: &str) -> ReplicaGen {
        self.state.read().tracker.get(other_replica_uid)
    }

    /// Records what this replica knows about another one, as one atomic
    /// log record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `other_replica_uid` is this replica (`InvalidReplicaUid`)
    /// - `generation` is lower than the recorded one (`InvalidGeneration`)
    /// - the record cannot be persisted
    pub fn set_replica_gen_and_trans_id(
        &self,
        other_replica_uid: &str,
        generation: Generation,
        trans_id: &str,
    ) -> CoreResult<()> {
        if other_replica_uid == self.replica_uid {
            return Err(CoreError::invalid_replica_uid(other_replica_uid));
        }
        let _guard = self.write_lock.lock();
        self.ensure_open()?;

        let known = self.state.read().tracker.get(other_replica_uid);
        if generation < known.generation {
            return Err(CoreError::InvalidGeneration {
                generation,
                known: known.generation,
            });
        }
        self.log.append(&LogRecord::ReplicaGen {
            replica_uid: other_replica_uid.to_string(),
            generation,
            trans_id: trans_id.to_string(),
        })?;
        self.state
            .write()
            .tracker
            .set(other_replica_uid, ReplicaGen::new(generation, trans_id));
        tracing::debug!(
            other = other_replica_uid,
            generation,
            trans_id,
            "recorded replica generation"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Flushes the log to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend sync fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.log.flush()
    }

    /// Deletes the whole store: every record is removed and the store
    /// refuses further writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be cleared.
    pub fn delete_database(&self) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        self.ensure_open()?;
        self.log.clear()?;
        *self.state.write() = StoreState::default();
        *self.is_open.write() = false;
        for observer in self.observers.read().iter() {
            observer.on_clear();
        }
        tracing::info!(replica_uid = %self.replica_uid, "deleted document store");
        Ok(())
    }

    /// Checks if the store accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if *self.is_open.read() {
            Ok(())
        } else {
            Err(CoreError::StoreClosed)
        }
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("replica_uid", &self.replica_uid)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

/// Accepts ids made of ASCII letters, digits and `.%_-`.
fn validate_doc_id(doc_id: &str) -> CoreResult<()> {
    let valid = !doc_id.is_empty()
        && doc_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'%' | b'_' | b'-'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidDocId {
            doc_id: doc_id.to_string(),
        })
    }
}

fn encode_content(content: Option<&Value>) -> CoreResult<Option<String>> {
    Ok(content.map(serde_json::to_string).transpose()?)
}

fn decode_content(content: Option<&str>) -> CoreResult<Option<Value>> {
    Ok(content.map(serde_json::from_str).transpose()?)
}

fn encode_conflicts(conflicts: &[Conflict]) -> CoreResult<Vec<ConflictRecord>> {
    conflicts
        .iter()
        .map(|c| {
            Ok(ConflictRecord {
                revision: c.rev.clone(),
                content: encode_content(c.content.as_ref())?,
            })
        })
        .collect()
}

fn decode_conflicts(conflicts: Vec<ConflictRecord>) -> CoreResult<Vec<Conflict>> {
    conflicts
        .into_iter()
        .map(|c| {
            Ok(Conflict {
                content: decode_content(c.content.as_deref())?,
                rev: c.revision,
            })
        })
        .collect()
}
