//! Log record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{Generation, SourceInfo};
use serde::{Deserialize, Serialize};

/// Current record format version, stored as the first byte of every record.
pub const RECORD_VERSION: u8 = 1;

/// A conflicting revision kept alongside the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Revision of the conflicting version.
    pub revision: String,
    /// JSON text of its content, `None` for a tombstone.
    pub content: Option<String>,
}

/// Provenance of a synced write, recorded with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Sending replica.
    pub replica_uid: String,
    /// Its generation at the change.
    pub generation: Generation,
    /// Its transaction id at the change.
    pub trans_id: String,
}

impl From<&SourceInfo> for SourceRecord {
    fn from(source: &SourceInfo) -> Self {
        Self {
            replica_uid: source.replica_uid.clone(),
            generation: source.generation,
            trans_id: source.trans_id.clone(),
        }
    }
}

/// One persisted state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRecord {
    /// The replica uid of the store.
    Identity {
        /// Replica uid.
        replica_uid: String,
    },

    /// A transaction log entry with the document's post-state.
    Mutation {
        /// Mutated document.
        doc_id: String,
        /// Transaction id of the mutation.
        trans_id: String,
        /// Revision after the mutation.
        revision: String,
        /// JSON text of the content after the mutation, `None` if deleted.
        content: Option<String>,
        /// Conflict set after the mutation.
        conflicts: Vec<ConflictRecord>,
        /// Provenance when the mutation was applied by sync.
        source: Option<SourceRecord>,
    },

    /// A new conflict set for a document whose current version is unchanged.
    Conflicts {
        /// Affected document.
        doc_id: String,
        /// Conflict set after the change.
        conflicts: Vec<ConflictRecord>,
    },

    /// What this replica knows about another replica.
    ReplicaGen {
        /// The other replica.
        replica_uid: String,
        /// Its known generation.
        generation: Generation,
        /// Its transaction id at that generation.
        trans_id: String,
    },
}

impl LogRecord {
    /// Encodes the record: one version byte followed by CBOR.
    ///
    /// # Errors
    ///
    /// Returns a codec error if serialization fails.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut buf = vec![RECORD_VERSION];
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes a record produced by [`LogRecord::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] for an empty record or an
    /// unknown version, and a codec error for undecodable CBOR.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let (&version, payload) = data
            .split_first()
            .ok_or_else(|| CoreError::log_corruption("empty log record"))?;
        if version != RECORD_VERSION {
            return Err(CoreError::log_corruption(format!(
                "unsupported record version {version}"
            )));
        }
        ciborium::from_reader(payload).map_err(|e| CoreError::codec(e.to_string()))
    }

    /// Returns a short name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identity { .. } => "identity",
            Self::Mutation { .. } => "mutation",
            Self::Conflicts { .. } => "conflicts",
            Self::ReplicaGen { .. } => "replica_gen",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_survives_encoding() {
        let record = LogRecord::Mutation {
            doc_id: "doc".into(),
            trans_id: "T-1".into(),
            revision: "a:1|b:2".into(),
            content: Some(r#"{"k":1}"#.into()),
            conflicts: vec![ConflictRecord {
                revision: "c:1".into(),
                content: None,
            }],
            source: Some(SourceRecord {
                replica_uid: "b".into(),
                generation: 7,
                trans_id: "T-b".into(),
            }),
        };
        let bytes = record.encode().unwrap();
        assert_eq!(bytes[0], RECORD_VERSION);
        assert_eq!(LogRecord::decode(&bytes).unwrap(), record);
    }

    #[test]
    fn empty_record_is_corruption() {
        assert!(matches!(
            LogRecord::decode(&[]),
            Err(CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn unknown_version_is_corruption() {
        let mut bytes = LogRecord::Identity {
            replica_uid: "r".into(),
        }
        .encode()
        .unwrap();
        bytes[0] = 99;
        assert!(matches!(
            LogRecord::decode(&bytes),
            Err(CoreError::LogCorruption { .. })
        ));
    }

    #[test]
    fn garbage_payload_is_codec_error() {
        assert!(matches!(
            LogRecord::decode(&[RECORD_VERSION, 0xFF, 0x00]),
            Err(CoreError::Codec { .. })
        ));
    }
}
