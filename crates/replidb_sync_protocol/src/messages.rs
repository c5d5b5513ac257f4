//! Protocol messages for sync.
//!
//! Every message is a `serde` type carried as one JSON object. Exchange
//! requests and responses are carried as sync streams (see
//! [`encode_stream`](crate::encode_stream)); the others as single objects.

use crate::error::{ErrorKind, ProtocolError, ProtocolResult};
use crate::stream::{decode_stream, encode_stream};
use serde::{Deserialize, Serialize};

/// A document on the wire, with the sender's generation at its change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeDoc {
    /// Document id.
    pub id: String,
    /// Revision string.
    pub rev: String,
    /// JSON text of the content, `None` for a tombstone.
    pub content: Option<String>,
    /// Sender's generation at the change.
    pub gen: u64,
    /// Sender's transaction id at the change.
    pub trans_id: String,
}

/// First line of an exchange request stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Replica sending the request.
    pub source_replica_uid: String,
    /// What the source knows about the target's generation.
    pub last_known_generation: u64,
    /// Target's transaction id at that generation.
    pub last_known_trans_id: String,
}

/// One exchange round as sent by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRequest {
    /// Request header.
    pub header: RequestHeader,
    /// Documents pushed to the target, in the source's change order.
    pub docs: Vec<ExchangeDoc>,
}

impl ExchangeRequest {
    /// Encodes the request as a sync stream.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be serialized.
    pub fn to_stream(&self) -> ProtocolResult<String> {
        encode_stream(&self.header, &self.docs)
    }

    /// Decodes a request stream.
    ///
    /// # Errors
    ///
    /// Returns a broken stream error for malformed input.
    pub fn from_stream(data: &str) -> ProtocolResult<Self> {
        let (header, docs) = decode_stream(data)?;
        Ok(Self { header, docs })
    }
}

/// First line of an exchange response stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeHeader {
    /// Target generation after applying the pushed documents.
    pub new_generation: u64,
    /// Target transaction id at that generation.
    #[serde(default)]
    pub new_trans_id: String,
}

/// The target's answer to an exchange round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResponse {
    /// Response header.
    pub header: ExchangeHeader,
    /// Documents the source has not seen, in ascending generation order.
    pub docs: Vec<ExchangeDoc>,
}

impl ExchangeResponse {
    /// Encodes the response as a sync stream.
    ///
    /// # Errors
    ///
    /// Returns an error if a message cannot be serialized.
    pub fn to_stream(&self) -> ProtocolResult<String> {
        encode_stream(&self.header, &self.docs)
    }

    /// Decodes a response stream.
    ///
    /// # Errors
    ///
    /// Returns a broken stream error for malformed input, or the remote
    /// error the stream carries.
    pub fn from_stream(data: &str) -> ProtocolResult<Self> {
        let (header, docs) = decode_stream(data)?;
        Ok(Self { header, docs })
    }
}

/// The target's view of a sync relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncInfo {
    /// Target replica uid.
    pub target_replica_uid: String,
    /// Target's current generation.
    pub target_generation: u64,
    /// Target's current transaction id.
    pub target_trans_id: String,
    /// Source generation the target has incorporated.
    pub source_last_known_generation: u64,
    /// Source transaction id at that generation.
    pub source_last_known_trans_id: String,
}

/// Asks the target to record what it knows about the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSyncInfo {
    /// Source replica uid.
    pub source_replica_uid: String,
    /// Source generation.
    pub generation: u64,
    /// Source transaction id at that generation.
    pub trans_id: String,
}

/// An error reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Wire name of the [`ErrorKind`].
    pub error: String,
    /// Optional detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Creates an error reply of `kind`.
    pub fn new(kind: ErrorKind, message: Option<String>) -> Self {
        Self {
            error: kind.as_str().to_string(),
            message,
        }
    }

    /// Converts the reply into the error it signals.
    #[must_use]
    pub fn into_error(self) -> ProtocolError {
        match self.error.parse::<ErrorKind>() {
            Ok(kind) => ProtocolError::remote(kind, self.message),
            Err(err) => err,
        }
    }

    /// Checks a single-object reply for an error.
    ///
    /// # Errors
    ///
    /// Returns the signaled error if `value` is an error object.
    pub fn check(value: &serde_json::Value) -> ProtocolResult<()> {
        if value.get("error").is_some() {
            let body: Self = serde_json::from_value(value.clone())
                .map_err(|e| ProtocolError::broken(format!("invalid error object: {e}")))?;
            return Err(body.into_error());
        }
        Ok(())
    }
}

/// Decodes a single-object reply, surfacing error objects.
///
/// # Errors
///
/// Returns the signaled error, or a broken stream error if the reply does
/// not decode as `T`.
pub fn decode_reply<T: serde::de::DeserializeOwned>(data: &str) -> ProtocolResult<T> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| ProtocolError::broken(format!("invalid reply: {e}")))?;
    ErrorBody::check(&value)?;
    serde_json::from_value(value).map_err(|e| ProtocolError::broken(format!("invalid reply: {e}")))
}
