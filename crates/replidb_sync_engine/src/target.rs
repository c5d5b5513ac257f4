//! Sync targets.

use crate::error::SyncResult;
use crate::exchange::{sync_exchange, DocAtGen};
use crate::observer::{SyncObserver, SyncPhase};
use parking_lot::RwLock;
use replidb_core::{Document, DocumentStore, Generation};
use replidb_sync_protocol::SyncInfo;
use std::sync::Arc;

/// The far side of a sync session.
///
/// Implement this trait to reach a target replica: [`LocalSyncTarget`]
/// wraps a store in the same process, and
/// [`StreamSyncTarget`](crate::StreamSyncTarget) goes through the sync
/// stream codec and an [`ExchangeClient`](crate::ExchangeClient).
pub trait SyncTarget: Send + Sync {
    /// Returns the target's identity, generation and what it knows about
    /// `source_replica_uid`.
    fn get_sync_info(&self, source_replica_uid: &str) -> SyncResult<SyncInfo>;

    /// Runs one exchange round; see [`sync_exchange`].
    fn sync_exchange(
        &self,
        docs_by_gen: &[DocAtGen],
        source_replica_uid: &str,
        last_known_generation: Generation,
        last_known_trans_id: &str,
        return_doc_cb: &mut dyn FnMut(Document, Generation, String) -> SyncResult<()>,
    ) -> SyncResult<(Generation, String)>;

    /// Records what the target knows about the source.
    fn record_sync_info(
        &self,
        source_replica_uid: &str,
        source_generation: Generation,
        source_trans_id: &str,
    ) -> SyncResult<()>;
}

impl<T: SyncTarget + ?Sized> SyncTarget for Arc<T> {
    fn get_sync_info(&self, source_replica_uid: &str) -> SyncResult<SyncInfo> {
        (**self).get_sync_info(source_replica_uid)
    }

    fn sync_exchange(
        &self,
        docs_by_gen: &[DocAtGen],
        source_replica_uid: &str,
        last_known_generation: Generation,
        last_known_trans_id: &str,
        return_doc_cb: &mut dyn FnMut(Document, Generation, String) -> SyncResult<()>,
    ) -> SyncResult<(Generation, String)> {
        (**self).sync_exchange(
            docs_by_gen,
            source_replica_uid,
            last_known_generation,
            last_known_trans_id,
            return_doc_cb,
        )
    }

    fn record_sync_info(
        &self,
        source_replica_uid: &str,
        source_generation: Generation,
        source_trans_id: &str,
    ) -> SyncResult<()> {
        (**self).record_sync_info(source_replica_uid, source_generation, source_trans_id)
    }
}

/// A sync target backed by a store in this process.
pub struct LocalSyncTarget {
    store: Arc<DocumentStore>,
    observer: RwLock<Option<Arc<dyn SyncObserver>>>,
}

impl LocalSyncTarget {
    /// Creates a target over `store`.
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            observer: RwLock::new(None),
        }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Installs (or removes) the observer called at every exchange phase.
    pub fn set_observer(&self, observer: Option<Arc<dyn SyncObserver>>) {
        *self.observer.write() = observer;
    }
}

impl SyncTarget for LocalSyncTarget {
    fn get_sync_info(&self, source_replica_uid: &str) -> SyncResult<SyncInfo> {
        let (target_generation, target_trans_id) = self.store.generation_info();
        let known = self.store.get_replica_gen_and_trans_id(source_replica_uid);
        Ok(SyncInfo {
            target_replica_uid: self.store.replica_uid().to_string(),
            target_generation,
            target_trans_id,
            source_last_known_generation: known.generation,
            source_last_known_trans_id: known.trans_id,
        })
    }

    fn sync_exchange(
        &self,
        docs_by_gen: &[DocAtGen],
        source_replica_uid: &str,
        last_known_generation: Generation,
        last_known_trans_id: &str,
        return_doc_cb: &mut dyn FnMut(Document, Generation, String) -> SyncResult<()>,
    ) -> SyncResult<(Generation, String)> {
        let observer = self.observer.read().clone();
        sync_exchange(
            &self.store,
            docs_by_gen,
            source_replica_uid,
            last_known_generation,
            last_known_trans_id,
            return_doc_cb,
            observer.as_deref(),
        )
    }

    fn record_sync_info(
        &self,
        source_replica_uid: &str,
        source_generation: Generation,
        source_trans_id: &str,
    ) -> SyncResult<()> {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_phase(SyncPhase::RecordSyncInfo)?;
        }
        self.store
            .set_replica_gen_and_trans_id(source_replica_uid, source_generation, source_trans_id)?;
        Ok(())
    }
}

impl std::fmt::Debug for LocalSyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSyncTarget")
            .field("replica_uid", &self.store.replica_uid())
            .finish_non_exhaustive()
    }
}
