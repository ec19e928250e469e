//! Shared state of the in-memory store.

use crate::config::StoreConfig;
use crate::error::{SessionError, SessionResult};
use crate::memory::session::MemorySession;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Identifier of a row within a table.
pub type RowId = u64;

pub(crate) type SessionId = u64;

/// (table, row) pair addressing one row.
pub(crate) type RowKey = (String, RowId);

/// Interval between lock attempts while waiting on a conflicting session.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// A write against one row, staged by a session or a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RowWrite {
    /// Insert or replace the row value.
    Put(String),
    /// Remove the row.
    Delete,
}

/// Lifecycle events counted by the store.
#[derive(Debug, Clone, Copy)]
pub(crate) enum StoreEvent {
    SessionDisposed,
    TransactionBegun,
    Committed,
    RolledBack,
    Abandoned,
    RowsSaved(usize),
}

/// Snapshot of the store's lifecycle counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Sessions created against the store.
    pub sessions_opened: u64,
    /// Sessions disposed.
    pub sessions_disposed: u64,
    /// Transactions opened.
    pub transactions_begun: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions explicitly rolled back.
    pub rollbacks: u64,
    /// Transactions released without commit or rollback.
    pub abandoned: u64,
    /// Rows affected by successful saves.
    pub rows_saved: u64,
}

#[derive(Debug, Default)]
struct Counters {
    sessions_opened: AtomicU64,
    sessions_disposed: AtomicU64,
    transactions_begun: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    abandoned: AtomicU64,
    rows_saved: AtomicU64,
}

enum LockAttempt {
    Acquired,
    AlreadyHeld,
    Conflict,
}

#[derive(Debug)]
struct StoreInner {
    config: StoreConfig,
    /// Committed rows: table -> row id -> value.
    tables: RwLock<HashMap<String, BTreeMap<RowId, String>>>,
    /// Row locks: (table, row) -> owning session.
    locks: Mutex<HashMap<RowKey, SessionId>>,
    next_row: AtomicU64,
    next_session: AtomicU64,
    counters: Counters,
}

/// An in-memory relational store shared by many sessions.
///
/// Rows are string values addressed by table name and [`RowId`]. Writers
/// take a row lock when they save and keep it until their transaction
/// completes, so two sessions updating the same row conflict the way they
/// would on a real relational database.
///
/// Cloning is cheap; clones share the same rows.
///
/// # Example
///
/// ```rust
/// use uowkit_session::MemoryStore;
///
/// let store = MemoryStore::relational();
/// let row = store.seed("entities", "seed");
/// assert_eq!(store.get("entities", row).as_deref(), Some("seed"));
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                tables: RwLock::new(HashMap::new()),
                locks: Mutex::new(HashMap::new()),
                next_row: AtomicU64::new(1),
                next_session: AtomicU64::new(1),
                counters: Counters::default(),
            }),
        }
    }

    /// Creates an empty relational store.
    #[must_use]
    pub fn relational() -> Self {
        Self::new(StoreConfig::relational())
    }

    /// Creates an empty store without transaction support.
    #[must_use]
    pub fn non_relational() -> Self {
        Self::new(StoreConfig::non_relational())
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Opens a new session against the store.
    #[must_use]
    pub fn session(&self) -> MemorySession {
        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        self.inner
            .counters
            .sessions_opened
            .fetch_add(1, Ordering::SeqCst);
        MemorySession::new(id, self.clone())
    }

    /// Inserts a committed row directly, bypassing sessions and locks.
    pub fn seed(&self, table: &str, value: impl Into<String>) -> RowId {
        let row = self.allocate_row();
        self.inner
            .tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(row, value.into());
        row
    }

    /// Returns the committed value of a row.
    #[must_use]
    pub fn get(&self, table: &str, row: RowId) -> Option<String> {
        self.inner
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(&row).cloned())
    }

    /// Returns all committed rows of a table in row order.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<(RowId, String)> {
        self.table_snapshot(table).into_iter().collect()
    }

    /// Returns the number of committed rows in a table.
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        self.inner.tables.read().get(table).map_or(0, BTreeMap::len)
    }

    /// Returns the committed row with the lowest id.
    #[must_use]
    pub fn first(&self, table: &str) -> Option<(RowId, String)> {
        self.inner
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.iter().next().map(|(id, v)| (*id, v.clone())))
    }

    /// Returns the number of rows currently locked by any session.
    #[must_use]
    pub fn locked_rows(&self) -> usize {
        self.inner.locks.lock().len()
    }

    /// Returns a snapshot of the lifecycle counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            sessions_opened: c.sessions_opened.load(Ordering::SeqCst),
            sessions_disposed: c.sessions_disposed.load(Ordering::SeqCst),
            transactions_begun: c.transactions_begun.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            rollbacks: c.rollbacks.load(Ordering::SeqCst),
            abandoned: c.abandoned.load(Ordering::SeqCst),
            rows_saved: c.rows_saved.load(Ordering::SeqCst),
        }
    }

    pub(crate) fn allocate_row(&self) -> RowId {
        self.inner.next_row.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn table_snapshot(&self, table: &str) -> BTreeMap<RowId, String> {
        self.inner
            .tables
            .read()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Acquires the lock on a row for `owner`.
    ///
    /// Returns `Ok(true)` if the lock was newly taken and `Ok(false)` if the
    /// owner already held it. Waits up to the configured lock timeout while
    /// another session holds the row.
    pub(crate) async fn acquire(
        &self,
        key: &RowKey,
        owner: SessionId,
        cancel: &CancellationToken,
    ) -> SessionResult<bool> {
        let timeout = self.inner.config.lock_timeout;
        // A timeout too large to represent waits without a deadline.
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }

            match self.try_lock(key, owner) {
                LockAttempt::Acquired => return Ok(true),
                LockAttempt::AlreadyHeld => return Ok(false),
                LockAttempt::Conflict => {}
            }

            if timeout.is_zero() {
                return Err(SessionError::Locked {
                    table: key.0.clone(),
                    row: key.1,
                });
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(SessionError::LockTimeout {
                    table: key.0.clone(),
                    row: key.1,
                    timeout,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = tokio::time::sleep(LOCK_POLL_INTERVAL) => {}
            }
        }
    }

    fn try_lock(&self, key: &RowKey, owner: SessionId) -> LockAttempt {
        let mut locks = self.inner.locks.lock();
        match locks.get(key) {
            Some(&holder) if holder == owner => LockAttempt::AlreadyHeld,
            Some(_) => LockAttempt::Conflict,
            None => {
                locks.insert(key.clone(), owner);
                LockAttempt::Acquired
            }
        }
    }

    /// Releases the given locks if `owner` holds them.
    pub(crate) fn release(&self, keys: &[RowKey], owner: SessionId) {
        let mut locks = self.inner.locks.lock();
        for key in keys {
            if locks.get(key) == Some(&owner) {
                locks.remove(key);
            }
        }
    }

    /// Releases every lock held by `owner`.
    pub(crate) fn release_all(&self, owner: SessionId) {
        self.inner.locks.lock().retain(|_, holder| *holder != owner);
    }

    /// Applies writes to the committed rows in one step.
    pub(crate) fn apply(&self, writes: impl IntoIterator<Item = (RowKey, RowWrite)>) {
        let mut tables = self.inner.tables.write();
        for ((table, row), write) in writes {
            match write {
                RowWrite::Put(value) => {
                    tables.entry(table).or_default().insert(row, value);
                }
                RowWrite::Delete => {
                    if let Some(rows) = tables.get_mut(&table) {
                        rows.remove(&row);
                    }
                }
            }
        }
    }

    pub(crate) fn record(&self, event: StoreEvent) {
        let c = &self.inner.counters;
        let (counter, amount) = match event {
            StoreEvent::SessionDisposed => (&c.sessions_disposed, 1),
            StoreEvent::TransactionBegun => (&c.transactions_begun, 1),
            StoreEvent::Committed => (&c.commits, 1),
            StoreEvent::RolledBack => (&c.rollbacks, 1),
            StoreEvent::Abandoned => (&c.abandoned, 1),
            StoreEvent::RowsSaved(rows) => (&c.rows_saved, rows as u64),
        };
        counter.fetch_add(amount, Ordering::SeqCst);
    }
}
