//! Per-peer sync state.
//!
//! For every other replica this replica has synced with, the tracker keeps
//! the generation and transaction id of that replica's history which has
//! already been incorporated here. Unknown replicas report `(0, "")`.

use crate::error::{CoreError, CoreResult};
use crate::types::{Generation, ReplicaGen};
use std::collections::HashMap;

/// Known generations of other replicas.
#[derive(Debug, Clone, Default)]
pub struct SyncStateTracker {
    known: HashMap<String, ReplicaGen>,
}

impl SyncStateTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns what is known about `replica_uid`, `(0, "")` if nothing.
    #[must_use]
    pub fn get(&self, replica_uid: &str) -> ReplicaGen {
        self.known.get(replica_uid).cloned().unwrap_or_default()
    }

    /// Records what is known about `replica_uid`.
    pub fn set(&mut self, replica_uid: &str, known: ReplicaGen) {
        self.known.insert(replica_uid.to_string(), known);
    }

    /// Checks that a replica's claimed position does not move backwards.
    ///
    /// A lower generation than the recorded one means the replica was
    /// rolled back; the same generation with another transaction id means
    /// its history diverged. A higher generation is always acceptable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidGeneration`] or
    /// [`CoreError::InvalidTransactionId`].
    pub fn validate(
        &self,
        replica_uid: &str,
        generation: Generation,
        trans_id: &str,
    ) -> CoreResult<()> {
        let known = self.get(replica_uid);
        if generation < known.generation {
            return Err(CoreError::InvalidGeneration {
                generation,
                known: known.generation,
            });
        }
        if generation > known.generation || trans_id == known.trans_id {
            return Ok(());
        }
        Err(CoreError::InvalidTransactionId {
            generation,
            expected: known.trans_id,
            actual: trans_id.to_string(),
        })
    }

    /// Returns the number of replicas with recorded state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.known.len()
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
