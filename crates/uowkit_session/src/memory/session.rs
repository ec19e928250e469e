//! Session over the in-memory store.

use crate::error::{SessionError, SessionResult};
use crate::memory::store::{MemoryStore, RowId, RowKey, RowWrite, SessionId, StoreEvent};
use crate::memory::transaction::{MemoryTransaction, OpenTransaction, TransactionLink};
use crate::session::{Session, Transaction};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A mutation staged by a session and not yet saved.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mutation {
    Insert {
        table: String,
        row: RowId,
        value: String,
    },
    Update {
        table: String,
        row: RowId,
        value: String,
    },
    Delete {
        table: String,
        row: RowId,
    },
}

impl Mutation {
    fn key(&self) -> RowKey {
        match self {
            Mutation::Insert { table, row, .. }
            | Mutation::Update { table, row, .. }
            | Mutation::Delete { table, row } => (table.clone(), *row),
        }
    }

    fn into_write(self) -> (RowKey, RowWrite) {
        match self {
            Mutation::Insert { table, row, value } | Mutation::Update { table, row, value } => {
                ((table, row), RowWrite::Put(value))
            }
            Mutation::Delete { table, row } => ((table, row), RowWrite::Delete),
        }
    }
}

/// A session against a [`MemoryStore`].
///
/// Mutations are staged with [`insert`](Self::insert),
/// [`update`](Self::update) and [`delete`](Self::delete) and reach the store
/// on [`Session::save_changes`]. Inside a transaction, saved writes stay
/// private to the session until the transaction commits. Reads see committed
/// rows overlaid with the session's own saved-but-uncommitted writes.
#[derive(Debug)]
pub struct MemorySession {
    id: SessionId,
    store: MemoryStore,
    pending: Vec<Mutation>,
    link: TransactionLink,
    next_txid: u64,
    closed: bool,
}

impl MemorySession {
    pub(crate) fn new(id: SessionId, store: MemoryStore) -> Self {
        Self {
            id,
            store,
            pending: Vec::new(),
            link: Arc::new(Mutex::new(None)),
            next_txid: 0,
            closed: false,
        }
    }

    /// Returns the session id, unique within its store.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the store this session writes to.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Stages the insert of a new row and returns its id.
    pub fn insert(&mut self, table: &str, value: impl Into<String>) -> RowId {
        let row = self.store.allocate_row();
        self.pending.push(Mutation::Insert {
            table: table.to_string(),
            row,
            value: value.into(),
        });
        row
    }

    /// Stages an update of an existing row.
    pub fn update(&mut self, table: &str, row: RowId, value: impl Into<String>) {
        self.pending.push(Mutation::Update {
            table: table.to_string(),
            row,
            value: value.into(),
        });
    }

    /// Stages the deletion of an existing row.
    pub fn delete(&mut self, table: &str, row: RowId) {
        self.pending.push(Mutation::Delete {
            table: table.to_string(),
            row,
        });
    }

    /// Returns the number of staged mutations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drops all staged mutations.
    pub fn discard_pending(&mut self) {
        self.pending.clear();
    }

    /// Returns true while a transaction opened by this session is active.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.link.lock().is_some()
    }

    /// Returns true once the session has been disposed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the value of a row as seen by this session.
    #[must_use]
    pub fn get(&self, table: &str, row: RowId) -> Option<String> {
        if let Some(open) = self.link.lock().as_ref() {
            match open.writes.get(&(table.to_string(), row)) {
                Some(RowWrite::Put(value)) => return Some(value.clone()),
                Some(RowWrite::Delete) => return None,
                None => {}
            }
        }
        self.store.get(table, row)
    }

    /// Returns all rows of a table as seen by this session.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<(RowId, String)> {
        let mut rows = self.store.table_snapshot(table);
        if let Some(open) = self.link.lock().as_ref() {
            overlay(&mut rows, table, &open.writes);
        }
        rows.into_iter().collect()
    }

    /// Returns the number of rows of a table as seen by this session.
    #[must_use]
    pub fn count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    /// Returns the row with the lowest id as seen by this session.
    #[must_use]
    pub fn first(&self, table: &str) -> Option<(RowId, String)> {
        self.rows(table).into_iter().next()
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    /// Rejects updates and deletes of rows this session cannot see.
    fn validate_pending(&self) -> SessionResult<()> {
        let mut visible: HashMap<RowKey, bool> = HashMap::new();
        for mutation in &self.pending {
            let key = mutation.key();
            let exists = match visible.get(&key) {
                Some(exists) => *exists,
                None => self.get(&key.0, key.1).is_some(),
            };
            match mutation {
                Mutation::Insert { .. } => {
                    visible.insert(key, true);
                }
                Mutation::Update { .. } if !exists => {
                    return Err(SessionError::constraint(format!(
                        "cannot update missing row {} in table {}",
                        key.1, key.0
                    )));
                }
                Mutation::Update { .. } => {}
                Mutation::Delete { .. } if !exists => {
                    return Err(SessionError::constraint(format!(
                        "cannot delete missing row {} in table {}",
                        key.1, key.0
                    )));
                }
                Mutation::Delete { .. } => {
                    visible.insert(key, false);
                }
            }
        }
        Ok(())
    }
}

fn overlay(rows: &mut BTreeMap<RowId, String>, table: &str, writes: &BTreeMap<RowKey, RowWrite>) {
    for ((write_table, row), write) in writes {
        if write_table != table {
            continue;
        }
        match write {
            RowWrite::Put(value) => {
                rows.insert(*row, value.clone());
            }
            RowWrite::Delete => {
                rows.remove(row);
            }
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    fn is_relational(&self) -> bool {
        self.store.config().relational
    }

    async fn begin_transaction(
        &mut self,
        cancel: &CancellationToken,
    ) -> SessionResult<Box<dyn Transaction>> {
        self.ensure_open()?;
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        if !self.is_relational() {
            return Err(SessionError::not_supported(
                "the store has no transaction support",
            ));
        }

        let txid = {
            let mut link = self.link.lock();
            if link.is_some() {
                return Err(SessionError::not_supported(
                    "the session already has an open transaction",
                ));
            }
            self.next_txid += 1;
            *link = Some(OpenTransaction::new(self.next_txid));
            self.next_txid
        };
        self.store.record(StoreEvent::TransactionBegun);

        debug!(session = self.id, txn = txid, "memory transaction begun");
        Ok(Box::new(MemoryTransaction::new(
            self.store.clone(),
            Arc::clone(&self.link),
            self.id,
            txid,
        )))
    }

    async fn save_changes(&mut self, cancel: &CancellationToken) -> SessionResult<usize> {
        self.ensure_open()?;
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        if self.pending.is_empty() {
            return Ok(0);
        }
        self.validate_pending()?;

        let in_transaction = self.in_transaction();
        let keys: Vec<RowKey> = self.pending.iter().map(Mutation::key).collect();
        let mut acquired = Vec::new();
        for key in keys {
            match self.store.acquire(&key, self.id, cancel).await {
                Ok(true) => acquired.push(key),
                Ok(false) => {}
                Err(err) => {
                    // Locks taken inside a transaction are released when it completes.
                    if !in_transaction {
                        self.store.release(&acquired, self.id);
                    }
                    debug!(session = self.id, error = %err, "save failed");
                    return Err(err);
                }
            }
        }

        let rows = self.pending.len();
        let writes: Vec<(RowKey, RowWrite)> =
            self.pending.drain(..).map(Mutation::into_write).collect();
        if in_transaction {
            if let Some(open) = self.link.lock().as_mut() {
                open.writes.extend(writes);
            }
        } else {
            self.store.apply(writes);
            self.store.release(&acquired, self.id);
        }
        self.store.record(StoreEvent::RowsSaved(rows));

        Ok(rows)
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pending.clear();

        let abandoned = self.link.lock().take();
        if abandoned.is_some() {
            self.store.record(StoreEvent::Abandoned);
        }
        self.store.release_all(self.id);
        self.store.record(StoreEvent::SessionDisposed);

        debug!(session = self.id, "memory session disposed");
        Ok(())
    }
}
