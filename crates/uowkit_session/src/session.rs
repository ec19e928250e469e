//! Session and transaction capability traits.

use crate::error::SessionResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// An open, uncommitted transaction against a relational store.
///
/// A handle is driven to completion by exactly one of `commit` or
/// `rollback`, and its resources are released by `dispose`.
///
/// # Invariants
///
/// - A failed `commit` leaves the handle open; it can still be rolled back
///   or disposed
/// - `dispose` on a handle that was neither committed nor rolled back
///   abandons it: the store discards its writes
/// - `dispose` is idempotent
#[async_trait]
pub trait Transaction: Send {
    /// Makes all writes performed inside the transaction durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal fired, the transaction already
    /// completed, or the store failed.
    async fn commit(&mut self, cancel: &CancellationToken) -> SessionResult<()>;

    /// Discards all writes performed inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction already completed or the store
    /// failed.
    async fn rollback(&mut self) -> SessionResult<()>;

    /// Releases the handle's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the store failed while releasing.
    async fn dispose(&mut self) -> SessionResult<()>;
}

/// A data-access context that stages mutations against a store.
///
/// Implementors only need to be `Send`: a session is driven by one task at
/// a time. Parallel work uses one session per task.
#[async_trait]
pub trait Session: Send {
    /// Returns true if the backend has a transaction concept at all.
    fn is_relational(&self) -> bool;

    /// Opens a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SessionError::Cancelled`] if the signal already
    /// fired, or a store error if the transaction cannot be opened.
    async fn begin_transaction(
        &mut self,
        cancel: &CancellationToken,
    ) -> SessionResult<Box<dyn Transaction>>;

    /// Flushes pending mutations and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the signal fired, a row lock could not be
    /// acquired, or a constraint was violated. No rows are affected on error.
    async fn save_changes(&mut self, cancel: &CancellationToken) -> SessionResult<usize>;

    /// Releases the session's resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the store failed while releasing.
    async fn dispose(&mut self) -> SessionResult<()>;
}
