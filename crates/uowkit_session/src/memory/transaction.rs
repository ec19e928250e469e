//! Transaction handle of the in-memory store.

use crate::error::{SessionError, SessionResult};
use crate::memory::store::{MemoryStore, RowKey, RowWrite, SessionId, StoreEvent};
use crate::session::Transaction;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Writes of a transaction that has not completed yet.
#[derive(Debug)]
pub(crate) struct OpenTransaction {
    pub(crate) id: u64,
    pub(crate) writes: BTreeMap<RowKey, RowWrite>,
}

impl OpenTransaction {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            writes: BTreeMap::new(),
        }
    }
}

/// Slot shared by a session and its transaction handle.
///
/// The session stages saved writes into it; the handle drains it on
/// commit, rollback, or abandonment.
pub(crate) type TransactionLink = Arc<Mutex<Option<OpenTransaction>>>;

/// Completion state of a transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Writes can still be staged.
    Active,
    /// Writes were applied.
    Committed,
    /// Writes were discarded by an explicit rollback.
    RolledBack,
    /// Writes were discarded because the handle was released while active.
    Abandoned,
}

/// A transaction on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    id: u64,
    owner: SessionId,
    store: MemoryStore,
    link: TransactionLink,
    state: TransactionState,
    disposed: bool,
}

impl MemoryTransaction {
    pub(crate) fn new(store: MemoryStore, link: TransactionLink, owner: SessionId, id: u64) -> Self {
        Self {
            id,
            owner,
            store,
            link,
            state: TransactionState::Active,
            disposed: false,
        }
    }

    /// Returns the transaction id, unique within its session.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the completion state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Returns true once `dispose` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn ensure_active(&self) -> SessionResult<()> {
        if self.disposed || self.state != TransactionState::Active {
            return Err(SessionError::TransactionCompleted);
        }
        Ok(())
    }

    /// Takes this transaction's writes out of the shared slot.
    ///
    /// Returns `None` if the session already discarded them.
    fn take_open(&self) -> Option<OpenTransaction> {
        let mut link = self.link.lock();
        match link.as_ref() {
            Some(open) if open.id == self.id => link.take(),
            _ => None,
        }
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(&mut self, cancel: &CancellationToken) -> SessionResult<()> {
        self.ensure_active()?;
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }

        let open = self.take_open().ok_or(SessionError::Closed)?;
        let rows = open.writes.len();
        self.store.apply(open.writes);
        self.store.release_all(self.owner);
        self.state = TransactionState::Committed;
        self.store.record(StoreEvent::Committed);

        debug!(session = self.owner, txn = self.id, rows, "memory transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        self.ensure_active()?;

        let discarded = self.take_open().map_or(0, |open| open.writes.len());
        self.store.release_all(self.owner);
        self.state = TransactionState::RolledBack;
        self.store.record(StoreEvent::RolledBack);

        debug!(session = self.owner, txn = self.id, discarded, "memory transaction rolled back");
        Ok(())
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        if self.state == TransactionState::Active {
            self.state = TransactionState::Abandoned;
            if self.take_open().is_some() {
                self.store.release_all(self.owner);
                self.store.record(StoreEvent::Abandoned);
                debug!(session = self.owner, txn = self.id, "memory transaction abandoned");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;

    const TABLE: &str = "entities";

    #[tokio::test]
    async fn commit_applies_staged_writes() {
        let store = MemoryStore::relational();
        let cancel = CancellationToken::new();
        let mut session = store.session();

        let mut txn = session.begin_transaction(&cancel).await.unwrap();
        session.insert(TABLE, "committed");
        session.save_changes(&cancel).await.unwrap();
        assert_eq!(store.count(TABLE), 0);

        txn.commit(&cancel).await.unwrap();
        txn.dispose().await.unwrap();

        assert_eq!(store.count(TABLE), 1);
        assert_eq!(store.locked_rows(), 0);
        assert_eq!(store.stats().commits, 1);
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let store = MemoryStore::relational();
        let cancel = CancellationToken::new();
        let mut session = store.session();

        let mut txn = session.begin_transaction(&cancel).await.unwrap();
        session.insert(TABLE, "discarded");
        session.save_changes(&cancel).await.unwrap();

        txn.rollback().await.unwrap();

        assert_eq!(store.count(TABLE), 0);
        assert_eq!(store.locked_rows(), 0);
        assert!(!session.in_transaction());
    }

    #[tokio::test]
    async fn cancelled_commit_keeps_transaction_open() {
        let store = MemoryStore::relational();
        let live = CancellationToken::new();
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let mut session = store.session();

        let mut txn = session.begin_transaction(&live).await.unwrap();
        session.insert(TABLE, "pending");
        session.save_changes(&live).await.unwrap();

        let err = txn.commit(&cancelled).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(session.in_transaction());

        txn.rollback().await.unwrap();
        assert_eq!(store.count(TABLE), 0);
    }

    #[tokio::test]
    async fn completed_transaction_rejects_second_completion() {
        let store = MemoryStore::relational();
        let cancel = CancellationToken::new();
        let mut session = store.session();

        let mut txn = session.begin_transaction(&cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();

        assert_eq!(
            txn.commit(&cancel).await.unwrap_err(),
            SessionError::TransactionCompleted
        );
        assert_eq!(
            txn.rollback().await.unwrap_err(),
            SessionError::TransactionCompleted
        );
    }

    #[tokio::test]
    async fn dispose_while_active_abandons_once() {
        let store = MemoryStore::relational();
        let cancel = CancellationToken::new();
        let mut session = store.session();

        let mut txn = session.begin_transaction(&cancel).await.unwrap();
        session.insert(TABLE, "abandoned");
        session.save_changes(&cancel).await.unwrap();

        txn.dispose().await.unwrap();
        txn.dispose().await.unwrap();

        assert_eq!(store.count(TABLE), 0);
        assert_eq!(store.locked_rows(), 0);
        assert_eq!(store.stats().abandoned, 1);
        assert_eq!(
            txn.commit(&cancel).await.unwrap_err(),
            SessionError::TransactionCompleted
        );
    }

    #[tokio::test]
    async fn dispose_after_commit_is_not_an_abandon() {
        let store = MemoryStore::relational();
        let cancel = CancellationToken::new();
        let mut session = store.session();

        let mut txn = session.begin_transaction(&cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();
        txn.dispose().await.unwrap();

        assert_eq!(store.stats().abandoned, 0);
    }
}
