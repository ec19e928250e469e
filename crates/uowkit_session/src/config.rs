//! Configuration for the in-memory store.

use std::time::Duration;

/// Configuration for a [`crate::MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether the store supports transactions.
    pub relational: bool,
    /// How long `save_changes` waits for a row lock held by another session.
    ///
    /// Zero means a conflicting lock fails immediately. `Duration::MAX`
    /// waits until the lock is free or the operation is cancelled.
    pub lock_timeout: Duration,
}

impl StoreConfig {
    /// Creates the configuration of a relational store that fails lock
    /// conflicts immediately.
    pub fn relational() -> Self {
        Self {
            relational: true,
            lock_timeout: Duration::ZERO,
        }
    }

    /// Creates the configuration of a store without transaction support.
    pub fn non_relational() -> Self {
        Self {
            relational: false,
            lock_timeout: Duration::ZERO,
        }
    }

    /// Sets the lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::relational()
    }
}
