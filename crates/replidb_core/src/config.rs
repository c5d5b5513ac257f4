//! Store configuration.

/// Configuration for opening a document store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the log to durable storage after every write
    /// (safer but slower).
    pub sync_on_write: bool,

    /// Replica uid to use. A new store without one mints a random uid; an
    /// existing store must match the uid it was created with.
    pub replica_uid: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
            replica_uid: None,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the log on every write.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets the replica uid.
    #[must_use]
    pub fn replica_uid(mut self, uid: impl Into<String>) -> Self {
        self.replica_uid = Some(uid.into());
        self
    }
}
