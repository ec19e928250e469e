//! Unit-of-work state.

use crate::error::{UowError, UowResult};
use std::fmt;
use uowkit_session::Transaction;

/// Observable state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// No transaction is held.
    Idle,
    /// A transaction opened by this unit is held.
    InTransaction,
    /// The unit has been torn down and must not be used again.
    Disposed,
}

/// Holds at most one active transaction.
///
/// Every transition goes through this type, so the zero-or-one invariant
/// lives in one place.
#[derive(Default)]
pub(crate) struct TransactionSlot {
    active: Option<Box<dyn Transaction>>,
    disposed: bool,
}

impl TransactionSlot {
    pub(crate) fn state(&self) -> UnitOfWorkState {
        match (self.disposed, self.active.is_some()) {
            (true, _) => UnitOfWorkState::Disposed,
            (false, true) => UnitOfWorkState::InTransaction,
            (false, false) => UnitOfWorkState::Idle,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub(crate) fn ensure_usable(&self) -> UowResult<()> {
        if self.disposed {
            return Err(UowError::Disposed);
        }
        Ok(())
    }

    /// Stores a freshly opened transaction. The slot must be empty.
    pub(crate) fn install(&mut self, transaction: Box<dyn Transaction>) {
        debug_assert!(self.active.is_none(), "slot already holds a transaction");
        self.active = Some(transaction);
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Box<dyn Transaction>> {
        self.active.as_mut()
    }

    pub(crate) fn take(&mut self) -> Option<Box<dyn Transaction>> {
        self.active.take()
    }

    pub(crate) fn mark_disposed(&mut self) {
        self.active = None;
        self.disposed = true;
    }
}

impl fmt::Debug for TransactionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSlot")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uowkit_session::{CancellationToken, MemoryStore, Session};

    async fn open_transaction() -> Box<dyn Transaction> {
        let mut session = MemoryStore::relational().session();
        session
            .begin_transaction(&CancellationToken::new())
            .await
            .unwrap()
    }

    #[test]
    fn new_slot_is_idle() {
        let slot = TransactionSlot::default();
        assert_eq!(slot.state(), UnitOfWorkState::Idle);
        assert!(!slot.is_active());
        assert!(slot.ensure_usable().is_ok());
    }

    #[tokio::test]
    async fn install_then_take_returns_to_idle() {
        let mut slot = TransactionSlot::default();
        slot.install(open_transaction().await);
        assert_eq!(slot.state(), UnitOfWorkState::InTransaction);
        assert!(slot.current_mut().is_some());

        assert!(slot.take().is_some());
        assert_eq!(slot.state(), UnitOfWorkState::Idle);
    }

    #[tokio::test]
    async fn take_empties_slot() {
        let mut slot = TransactionSlot::default();
        slot.install(open_transaction().await);

        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
        assert!(!slot.is_active());
    }

    #[tokio::test]
    async fn disposed_slot_rejects_use() {
        let mut slot = TransactionSlot::default();
        slot.install(open_transaction().await);
        slot.mark_disposed();

        assert_eq!(slot.state(), UnitOfWorkState::Disposed);
        assert!(!slot.is_active());
        assert!(matches!(slot.ensure_usable(), Err(UowError::Disposed)));
    }
}
