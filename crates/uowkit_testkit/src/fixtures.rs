//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up stores, units of work,
//! and log output in tests.

use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use uowkit_core::{UnitOfWork, UnitOfWorkConfig};
use uowkit_session::{MemorySession, MemoryStore, StoreConfig};

/// Table used by the fixtures and scenarios.
pub const ENTITIES: &str = "entities";

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A store prepared for a test.
#[derive(Debug, Clone)]
pub struct TestStore {
    /// The store shared by every session the test opens.
    pub store: MemoryStore,
}

impl TestStore {
    /// Creates an empty relational store.
    pub fn relational() -> Self {
        Self::with_config(StoreConfig::relational())
    }

    /// Creates an empty store without transaction support.
    pub fn non_relational() -> Self {
        Self::with_config(StoreConfig::non_relational())
    }

    /// Creates a relational store whose writers wait up to `timeout` for
    /// row locks.
    pub fn with_lock_timeout(timeout: Duration) -> Self {
        Self::with_config(StoreConfig::relational().with_lock_timeout(timeout))
    }

    /// Creates an empty store with the given configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        init_tracing();
        Self {
            store: MemoryStore::new(config),
        }
    }

    /// Opens a unit of work over a new session.
    pub fn unit_of_work(&self) -> UnitOfWork<MemorySession> {
        UnitOfWork::new(self.store.session())
    }

    /// Opens a configured unit of work over a new session.
    pub fn unit_of_work_with(&self, config: UnitOfWorkConfig) -> UnitOfWork<MemorySession> {
        UnitOfWork::with_config(self.store.session(), config)
    }

    /// Returns the committed values of [`ENTITIES`] in row order.
    pub fn entity_values(&self) -> Vec<String> {
        self.store
            .rows(ENTITIES)
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }
}

impl std::ops::Deref for TestStore {
    type Target = MemoryStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use uowkit_session::RowId;

    /// Creates a relational store holding one committed row and returns the
    /// row id.
    pub fn seeded_store(value: &str) -> (TestStore, RowId) {
        let test_store = TestStore::relational();
        let row = test_store.seed(ENTITIES, value);
        (test_store, row)
    }

    /// Creates a relational store holding `count` committed rows.
    pub fn populated_store(count: usize) -> TestStore {
        let test_store = TestStore::relational();
        for i in 0..count {
            test_store.seed(ENTITIES, format!("seed-{i}"));
        }
        test_store
    }
}
