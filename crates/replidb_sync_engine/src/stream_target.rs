//! Sync target over the sync stream codec.
//!
//! The transport itself is abstracted via [`ExchangeClient`] so that any
//! request/response channel (HTTP, a socket, an in-process loopback) can
//! carry the exchange. Requests are posted to three endpoints:
//!
//! | path | request body | reply |
//! |------|--------------|-------|
//! | `/sync_info` | `{"source_replica_uid": ..}` | `SyncInfo` |
//! | `/sync_exchange` | request stream | response stream |
//! | `/record_sync_info` | `RecordSyncInfo` | `{}` |
//!
//! Errors travel as `{"error": kind}` objects, or as the last line of a
//! stream.

use crate::error::{SyncError, SyncResult};
use crate::exchange::DocAtGen;
use crate::observer::SyncObserver;
use crate::target::{LocalSyncTarget, SyncTarget};
use replidb_core::{Document, DocumentStore, Generation};
use replidb_sync_protocol::{
    decode_reply, encode_error_stream, ErrorBody, ExchangeDoc, ExchangeHeader, ExchangeRequest,
    ExchangeResponse, ProtocolError, RecordSyncInfo, RequestHeader, SyncInfo,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

const SYNC_INFO: &str = "/sync_info";
const SYNC_EXCHANGE: &str = "/sync_exchange";
const RECORD_SYNC_INFO: &str = "/record_sync_info";

/// Request/response channel to an [`ExchangeServer`].
///
/// Implement this trait to provide the actual transport.
pub trait ExchangeClient: Send + Sync {
    /// Sends a request and returns the reply body.
    ///
    /// An `Err` is a transport failure; errors of the exchange itself come
    /// back inside the reply.
    fn post(&self, path: &str, body: &str) -> Result<String, String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SyncInfoRequest {
    source_replica_uid: String,
}

/// A sync target reached through an [`ExchangeClient`].
#[derive(Debug)]
pub struct StreamSyncTarget<C: ExchangeClient> {
    client: C,
}

impl<C: ExchangeClient> StreamSyncTarget<C> {
    /// Creates a target over `client`.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn post(&self, path: &str, body: &str) -> SyncResult<String> {
        self.client.post(path, body).map_err(|e| {
            tracing::debug!(path, error = %e, "exchange transport failed");
            SyncError::transport_retryable(e)
        })
    }
}

impl<C: ExchangeClient> SyncTarget for StreamSyncTarget<C> {
    fn get_sync_info(&self, source_replica_uid: &str) -> SyncResult<SyncInfo> {
        let body = serde_json::to_string(&SyncInfoRequest {
            source_replica_uid: source_replica_uid.to_string(),
        })
        .map_err(ProtocolError::from)?;
        let reply = self.post(SYNC_INFO, &body)?;
        Ok(decode_reply(&reply)?)
    }

    fn sync_exchange(
        &self,
        docs_by_gen: &[DocAtGen],
        source_replica_uid: &str,
        last_known_generation: Generation,
        last_known_trans_id: &str,
        return_doc_cb: &mut dyn FnMut(Document, Generation, String) -> SyncResult<()>,
    ) -> SyncResult<(Generation, String)> {
        let request = ExchangeRequest {
            header: RequestHeader {
                source_replica_uid: source_replica_uid.to_string(),
                last_known_generation,
                last_known_trans_id: last_known_trans_id.to_string(),
            },
            docs: docs_by_gen
                .iter()
                .map(|(doc, generation, trans_id)| to_exchange_doc(doc, *generation, trans_id))
                .collect(),
        };
        let reply = self.post(SYNC_EXCHANGE, &request.to_stream()?)?;
        let response = ExchangeResponse::from_stream(&reply)?;

        let docs = response
            .docs
            .into_iter()
            .map(from_exchange_doc)
            .collect::<SyncResult<Vec<_>>>()?;
        for (doc, generation, trans_id) in docs {
            return_doc_cb(doc, generation, trans_id)?;
        }
        Ok((response.header.new_generation, response.header.new_trans_id))
    }

    fn record_sync_info(
        &self,
        source_replica_uid: &str,
        source_generation: Generation,
        source_trans_id: &str,
    ) -> SyncResult<()> {
        let body = serde_json::to_string(&RecordSyncInfo {
            source_replica_uid: source_replica_uid.to_string(),
            generation: source_generation,
            trans_id: source_trans_id.to_string(),
        })
        .map_err(ProtocolError::from)?;
        let reply = self.post(RECORD_SYNC_INFO, &body)?;
        decode_reply::<serde_json::Value>(&reply)?;
        Ok(())
    }
}

fn to_exchange_doc(doc: &Document, generation: Generation, trans_id: &str) -> ExchangeDoc {
    ExchangeDoc {
        id: doc.doc_id.clone(),
        rev: doc.rev.clone(),
        content: doc.get_json(),
        gen: generation,
        trans_id: trans_id.to_string(),
    }
}

fn from_exchange_doc(entry: ExchangeDoc) -> SyncResult<DocAtGen> {
    let doc = Document::from_json(entry.id, entry.rev, entry.content.as_deref()).map_err(|e| {
        SyncError::from(ProtocolError::broken(format!("invalid document content: {e}")))
    })?;
    Ok((doc, entry.gen, entry.trans_id))
}

/// Serves exchange requests for a store.
///
/// Runs the exchange against a [`LocalSyncTarget`] and encodes its outcome,
/// errors included, as the reply.
#[derive(Debug)]
pub struct ExchangeServer {
    target: LocalSyncTarget,
}

impl ExchangeServer {
    /// Creates a server for `store`.
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self {
            target: LocalSyncTarget::new(store),
        }
    }

    /// Returns the served store.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        self.target.store()
    }

    /// Installs (or removes) the observer called at every exchange phase.
    pub fn set_observer(&self, observer: Option<Arc<dyn SyncObserver>>) {
        self.target.set_observer(observer);
    }

    /// Handles one request and returns the reply body.
    ///
    /// # Errors
    ///
    /// Returns an error only for an unknown path, or when not even an
    /// error reply can be encoded.
    pub fn handle_post(&self, path: &str, body: &str) -> Result<String, String> {
        let reply = match path {
            SYNC_INFO => self.handle_sync_info(body),
            SYNC_EXCHANGE => {
                return self.handle_sync_exchange(body).or_else(|err| {
                    tracing::debug!(error = %err, "exchange failed");
                    encode_error_stream(err.wire_kind(), Some(err.to_string()))
                        .map_err(|e| e.to_string())
                });
            }
            RECORD_SYNC_INFO => self.handle_record_sync_info(body),
            other => return Err(format!("unknown path {other}")),
        };
        reply.or_else(|err| {
            serde_json::to_string(&ErrorBody::new(err.wire_kind(), Some(err.to_string())))
                .map_err(|e| e.to_string())
        })
    }

    fn handle_sync_info(&self, body: &str) -> SyncResult<String> {
        let request: SyncInfoRequest = decode_reply(body)?;
        let info = self.target.get_sync_info(&request.source_replica_uid)?;
        Ok(serde_json::to_string(&info).map_err(ProtocolError::from)?)
    }

    fn handle_sync_exchange(&self, body: &str) -> SyncResult<String> {
        let request = ExchangeRequest::from_stream(body)?;
        let docs_by_gen = request
            .docs
            .into_iter()
            .map(from_exchange_doc)
            .collect::<SyncResult<Vec<_>>>()?;

        let mut returned = Vec::new();
        let (new_generation, new_trans_id) = self.target.sync_exchange(
            &docs_by_gen,
            &request.header.source_replica_uid,
            request.header.last_known_generation,
            &request.header.last_known_trans_id,
            &mut |doc, generation, trans_id| {
                returned.push(to_exchange_doc(&doc, generation, &trans_id));
                Ok(())
            },
        )?;

        let response = ExchangeResponse {
            header: ExchangeHeader {
                new_generation,
                new_trans_id,
            },
            docs: returned,
        };
        Ok(response.to_stream()?)
    }

    fn handle_record_sync_info(&self, body: &str) -> SyncResult<String> {
        let request: RecordSyncInfo = decode_reply(body)?;
        self.target.record_sync_info(
            &request.source_replica_uid,
            request.generation,
            &request.trans_id,
        )?;
        Ok("{}".to_string())
    }
}

/// A client that routes requests directly to an in-process server.
///
/// Useful for testing without a network. Transport failures can be
/// simulated with [`LoopbackClient::set_offline`] and
/// [`LoopbackClient::fail_next`].
#[derive(Debug)]
pub struct LoopbackClient {
    server: Arc<ExchangeServer>,
    offline: AtomicBool,
    failures_left: AtomicU32,
}

impl LoopbackClient {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: Arc<ExchangeServer>) -> Self {
        Self {
            server,
            offline: AtomicBool::new(false),
            failures_left: AtomicU32::new(0),
        }
    }

    /// Makes every request fail until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `count` requests fail.
    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }
}

impl ExchangeClient for LoopbackClient {
    fn post(&self, path: &str, body: &str) -> Result<String, String> {
        if self.offline.load(Ordering::SeqCst) {
            return Err("connection refused".to_string());
        }
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err("connection reset".to_string());
        }
        self.server.handle_post(path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replidb_sync_protocol::ErrorKind;
    use serde_json::json;

    fn setup() -> (Arc<ExchangeServer>, StreamSyncTarget<LoopbackClient>) {
        let store = Arc::new(DocumentStore::open_in_memory("target").unwrap());
        let server = Arc::new(ExchangeServer::new(store));
        let target = StreamSyncTarget::new(LoopbackClient::new(Arc::clone(&server)));
        (server, target)
    }

    #[test]
    fn sync_info_over_stream() {
        let (server, target) = setup();
        server.store().create_doc(json!({})).unwrap();
        let info = target.get_sync_info("source").unwrap();
        assert_eq!(info.target_replica_uid, "target");
        assert_eq!(info.target_generation, 1);
        assert_eq!(info.source_last_known_generation, 0);
    }

    #[test]
    fn exchange_over_stream() {
        let (server, target) = setup();
        let local = server.store().create_doc(json!({"a": 1})).unwrap();
        let pushed = Document::new("pushed", "source:1", Some(json!({"b": 2})));

        let mut returned = Vec::new();
        let (new_gen, new_trans_id) = target
            .sync_exchange(
                &[(pushed, 1, "T-1".to_string())],
                "source",
                0,
                "",
                &mut |doc, generation, _| {
                    returned.push((doc, generation));
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(new_gen, 2);
        assert_eq!(new_trans_id, server.store().generation_info().1);
        assert_eq!(returned, vec![(local, 1)]);
        assert_eq!(
            server.store().get_doc("pushed", false).unwrap().content,
            Some(json!({"b": 2}))
        );
    }

    #[test]
    fn tombstones_cross_the_stream() {
        let (server, target) = setup();
        let mut doc = server.store().create_doc_with_id(json!({}), "gone").unwrap();
        server.store().delete_doc(&mut doc).unwrap();

        let mut returned = Vec::new();
        target
            .sync_exchange(&[], "source", 0, "", &mut |doc, _, _| {
                returned.push(doc);
                Ok(())
            })
            .unwrap();
        assert_eq!(returned.len(), 1);
        assert!(returned[0].is_tombstone());
    }

    #[test]
    fn errors_cross_the_stream() {
        let (server, target) = setup();
        server.store().create_doc(json!({})).unwrap();

        let err = target
            .sync_exchange(&[], "source", 1, "T-bogus", &mut |_, _, _| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidTransactionId));

        let err = target
            .sync_exchange(&[], "target", 0, "", &mut |_, _, _| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidReplicaUid));

        let err = target.record_sync_info("target", 1, "T-1").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidReplicaUid));
    }

    #[test]
    fn malformed_request_is_reported_as_broken_stream() {
        let (server, _) = setup();
        let reply = server.handle_post(SYNC_EXCHANGE, "[\r\n]").unwrap();
        let err = ExchangeResponse::from_stream(&reply).unwrap_err();
        assert!(err.is_broken_stream());
    }

    #[test]
    fn transport_failures_are_retryable() {
        let (_, target) = setup();
        target.client().fail_next(1);
        let err = target.get_sync_info("source").unwrap_err();
        assert!(err.is_retryable());
        assert!(target.get_sync_info("source").is_ok());

        target.client().set_offline(true);
        assert!(target.get_sync_info("source").unwrap_err().is_retryable());
    }

    #[test]
    fn unknown_path_is_a_transport_error() {
        let (server, _) = setup();
        assert!(server.handle_post("/nope", "{}").is_err());
    }
}
