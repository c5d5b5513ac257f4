//! Two-way sync sessions.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::exchange::DocAtGen;
use crate::target::SyncTarget;
use parking_lot::RwLock;
use replidb_core::{CoreError, Document, DocumentStore, Generation, PutState, SourceInfo};
use std::sync::Arc;
use std::time::Instant;

/// Statistics about sync sessions.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sessions completed successfully.
    pub sessions_completed: u64,
    /// Documents pushed to the target.
    pub docs_sent: u64,
    /// Documents received from the target.
    pub docs_received: u64,
    /// Received documents that conflicted with the local version.
    pub conflicts_encountered: u64,
    /// Retries performed by `sync_with_retry`.
    pub retries: u64,
    /// Completion time of the last successful session.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Drives sync sessions between a local store and a target.
///
/// # Example
///
/// ```rust
/// use replidb_core::DocumentStore;
/// use replidb_sync_engine::{LocalSyncTarget, Synchronizer};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let source = Arc::new(DocumentStore::open_in_memory("source").unwrap());
/// let target = Arc::new(DocumentStore::open_in_memory("target").unwrap());
/// let doc = source.create_doc(json!({"a": 1})).unwrap();
///
/// let sync = Synchronizer::new(source, LocalSyncTarget::new(target.clone()));
/// assert_eq!(sync.sync().unwrap(), 1);
/// assert_eq!(target.get_doc(&doc.doc_id, false), Some(doc));
/// ```
pub struct Synchronizer<T: SyncTarget> {
    source: Arc<DocumentStore>,
    target: T,
    config: SyncConfig,
    stats: RwLock<SyncStats>,
}

/// What one session did.
#[derive(Debug, Default)]
struct Session {
    sent: u64,
    received: u64,
    inserted: u64,
    conflicts: u64,
}

impl<T: SyncTarget> Synchronizer<T> {
    /// Creates a synchronizer with the default configuration.
    pub fn new(source: Arc<DocumentStore>, target: T) -> Self {
        Self::with_config(source, target, SyncConfig::default())
    }

    /// Creates a synchronizer.
    pub fn with_config(source: Arc<DocumentStore>, target: T, config: SyncConfig) -> Self {
        Self {
            source,
            target,
            config,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the local store.
    #[must_use]
    pub fn source(&self) -> &Arc<DocumentStore> {
        &self.source
    }

    /// Returns the target.
    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Returns the statistics.
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Runs one sync session and returns the local generation that was
    /// pushed to the target.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the target has this replica's uid (`InvalidReplicaUid`)
    /// - the target's knowledge of this replica, or this replica's
    ///   knowledge of the target, is not part of the other's history
    ///   (`InvalidGeneration` or `InvalidTransactionId`)
    /// - a step of the exchange fails; documents already applied on either
    ///   side stay applied, and the session can be retried
    pub fn sync(&self) -> SyncResult<Generation> {
        let result = self.run_session();
        let mut stats = self.stats.write();
        match &result {
            Ok((_, session)) => {
                stats.sessions_completed += 1;
                stats.docs_sent += session.sent;
                stats.docs_received += session.received;
                stats.conflicts_encountered += session.conflicts;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            Err(err) => stats.last_error = Some(err.to_string()),
        }
        result.map(|(generation, _)| generation)
    }

    /// Runs [`Self::sync`], retrying retryable failures with exponential
    /// backoff.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once the
    /// attempts are exhausted.
    pub fn sync_with_retry(&self) -> SyncResult<Generation> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match self.sync() {
                Ok(generation) => return Ok(generation),
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    self.stats.write().retries += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::warn!(attempt, ?delay, error = %err, "sync failed, retrying");
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn run_session(&self) -> SyncResult<(Generation, Session)> {
        let source_uid = self.source.replica_uid();
        let info = self.target.get_sync_info(source_uid)?;
        let target_uid = info.target_replica_uid.as_str();
        if target_uid == source_uid {
            return Err(CoreError::invalid_replica_uid(target_uid).into());
        }

        // Detect a rollback of this replica against what the target saw
        self.source.validate_gen_and_trans_id(
            info.source_last_known_generation,
            &info.source_last_known_trans_id,
        )?;

        let changed = self.source.whats_changed(info.source_last_known_generation);
        let my_gen = changed.generation;
        let known = self.source.get_replica_gen_and_trans_id(target_uid);

        if changed.changes.is_empty() && known.generation == info.target_generation {
            if known.trans_id != info.target_trans_id {
                return Err(CoreError::InvalidTransactionId {
                    generation: known.generation,
                    expected: known.trans_id,
                    actual: info.target_trans_id,
                }
                .into());
            }
            tracing::debug!(source = source_uid, target = target_uid, "nothing to sync");
            return Ok((my_gen, Session::default()));
        }

        let docs_by_gen: Vec<DocAtGen> = changed
            .changes
            .iter()
            .filter_map(|change| {
                self.source
                    .get_doc(&change.doc_id, true)
                    .map(|doc| (doc, change.generation, change.trans_id.clone()))
            })
            .collect();

        let mut session = Session::default();
        let mut last_known = (known.generation, known.trans_id);
        let batch_size = self.config.batch_limit.unwrap_or(docs_by_gen.len()).max(1);
        let mut batches: Vec<&[DocAtGen]> = docs_by_gen.chunks(batch_size).collect();
        if batches.is_empty() {
            batches.push(&[]);
        }

        for batch in batches {
            let mut apply = |doc: Document, generation: Generation, trans_id: String| -> SyncResult<()> {
                let provenance = SourceInfo::new(target_uid, generation, trans_id);
                let outcome = self.source.put_doc_if_newer(&doc, true, Some(&provenance))?;
                session.received += 1;
                match outcome.state {
                    PutState::Inserted => session.inserted += 1,
                    PutState::Conflicted => {
                        session.conflicts += 1;
                        if outcome.written {
                            session.inserted += 1;
                        }
                    }
                    PutState::Superseded | PutState::Autoresolved => {}
                }
                Ok(())
            };
            let (new_gen, new_trans_id) = self.target.sync_exchange(
                batch,
                source_uid,
                last_known.0,
                &last_known.1,
                &mut apply,
            )?;
            session.sent += batch.len() as u64;
            last_known = (new_gen, new_trans_id);
        }

        let (target_gen, target_trans_id) = last_known;
        self.source
            .set_replica_gen_and_trans_id(target_uid, target_gen, &target_trans_id)?;

        let (cur_gen, cur_trans_id) = self.source.generation_info();
        if session.inserted > 0 {
            if cur_gen == my_gen + session.inserted {
                self.target
                    .record_sync_info(source_uid, cur_gen, &cur_trans_id)?;
            } else {
                tracing::warn!(
                    source = source_uid,
                    target = target_uid,
                    my_gen,
                    cur_gen,
                    inserted = session.inserted,
                    "local write raced the sync, not recording sync info on target"
                );
            }
        }

        tracing::info!(
            source = source_uid,
            target = target_uid,
            sent = session.sent,
            received = session.received,
            conflicts = session.conflicts,
            target_gen,
            "sync complete"
        );
        Ok((my_gen, session))
    }
}

impl<T: SyncTarget + std::fmt::Debug> std::fmt::Debug for Synchronizer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("source", &self.source.replica_uid())
            .field("target", &self.target)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::LocalSyncTarget;
    use replidb_core::ReplicaGen;
    use serde_json::json;

    fn pair() -> (Arc<DocumentStore>, Arc<DocumentStore>) {
        (
            Arc::new(DocumentStore::open_in_memory("source").unwrap()),
            Arc::new(DocumentStore::open_in_memory("target").unwrap()),
        )
    }

    #[test]
    fn pushes_and_records_both_sides() {
        let (source, target) = pair();
        source.create_doc(json!({"a": 1})).unwrap();
        let sync = Synchronizer::new(Arc::clone(&source), LocalSyncTarget::new(Arc::clone(&target)));

        assert_eq!(sync.sync().unwrap(), 1);
        assert_eq!(target.generation(), 1);
        assert_eq!(
            target.get_replica_gen_and_trans_id("source"),
            ReplicaGen::new(1, source.generation_info().1)
        );
        assert_eq!(
            source.get_replica_gen_and_trans_id("target"),
            ReplicaGen::new(1, target.generation_info().1)
        );

        let stats = sync.stats();
        assert_eq!(stats.sessions_completed, 1);
        assert_eq!(stats.docs_sent, 1);
        assert_eq!(stats.docs_received, 0);
        assert!(stats.last_sync_time.is_some());
    }

    #[test]
    fn pulls_into_empty_source() {
        let (source, target) = pair();
        let doc = target.create_doc(json!({"b": 2})).unwrap();
        let sync = Synchronizer::new(Arc::clone(&source), LocalSyncTarget::new(Arc::clone(&target)));

        assert_eq!(sync.sync().unwrap(), 0);
        assert_eq!(source.get_doc(&doc.doc_id, false), Some(doc));
        // the target learned the source's new generation
        assert_eq!(target.get_replica_gen_and_trans_id("source").generation, 1);
    }

    #[test]
    fn second_sync_is_a_no_op() {
        let (source, target) = pair();
        source.create_doc(json!({})).unwrap();
        let sync = Synchronizer::new(Arc::clone(&source), LocalSyncTarget::new(Arc::clone(&target)));
        sync.sync().unwrap();
        let before = target.get_transaction_log();

        assert_eq!(sync.sync().unwrap(), 1);
        assert_eq!(target.get_transaction_log(), before);
        assert_eq!(sync.stats().docs_sent, 1);
    }

    #[test]
    fn target_with_same_uid_is_rejected() {
        let source = Arc::new(DocumentStore::open_in_memory("same").unwrap());
        let target = Arc::new(DocumentStore::open_in_memory("same").unwrap());
        let sync = Synchronizer::new(source, LocalSyncTarget::new(target));
        let err = sync.sync().unwrap_err();
        assert!(matches!(
            err,
            SyncError::Database(CoreError::InvalidReplicaUid { .. })
        ));
        assert!(sync.stats().last_error.is_some());
    }

    #[test]
    fn batches_resume_where_they_left() {
        let (source, target) = pair();
        for i in 0..5 {
            source.create_doc(json!({ "n": i })).unwrap();
        }
        let sync = Synchronizer::with_config(
            Arc::clone(&source),
            LocalSyncTarget::new(Arc::clone(&target)),
            SyncConfig::new().with_batch_limit(2),
        );
        assert_eq!(sync.sync().unwrap(), 5);
        assert_eq!(target.get_all_docs(false).1, source.get_all_docs(false).1);
        assert_eq!(
            target.get_replica_gen_and_trans_id("source"),
            ReplicaGen::new(5, source.generation_info().1)
        );
    }
}
