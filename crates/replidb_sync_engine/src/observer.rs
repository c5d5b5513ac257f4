//! Named checkpoints of an exchange round.

use crate::error::SyncResult;
use parking_lot::Mutex;
use std::fmt;

/// A checkpoint of the exchange at which observers are called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// The target snapshotted its generation, before applying the
    /// pushed documents.
    BeforeWhatsChanged,
    /// The target computed the changes the source has not seen.
    AfterWhatsChanged,
    /// The target is about to return its changes.
    BeforeGetDocs,
    /// The target is about to record what it knows about the source.
    RecordSyncInfo,
}

impl SyncPhase {
    /// Returns the trace name of this phase.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeforeWhatsChanged => "before whats_changed",
            Self::AfterWhatsChanged => "after whats_changed",
            Self::BeforeGetDocs => "before get_docs",
            Self::RecordSyncInfo => "record_sync_info",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observes the phases of exchanges run by a sync target.
///
/// Returning an error aborts the exchange at that phase. Documents already
/// applied stay applied, and the sync state is not recorded.
pub trait SyncObserver: Send + Sync {
    /// Called when the exchange reaches `phase`.
    fn on_phase(&self, phase: SyncPhase) -> SyncResult<()>;
}

impl<F> SyncObserver for F
where
    F: Fn(SyncPhase) -> SyncResult<()> + Send + Sync,
{
    fn on_phase(&self, phase: SyncPhase) -> SyncResult<()> {
        self(phase)
    }
}

/// An observer that records every phase it sees.
#[derive(Debug, Default)]
pub struct PhaseRecorder {
    phases: Mutex<Vec<SyncPhase>>,
}

impl PhaseRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded phases in order.
    #[must_use]
    pub fn phases(&self) -> Vec<SyncPhase> {
        self.phases.lock().clone()
    }

    /// Returns the recorded phase names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.phases.lock().iter().map(|p| p.name()).collect()
    }

    /// Forgets the recorded phases.
    pub fn clear(&self) {
        self.phases.lock().clear();
    }
}

impl SyncObserver for PhaseRecorder {
    fn on_phase(&self, phase: SyncPhase) -> SyncResult<()> {
        self.phases.lock().push(phase);
        Ok(())
    }
}
