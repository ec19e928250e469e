//! The unit-of-work coordinator.

use crate::config::{TeardownPolicy, UnitOfWorkConfig};
use crate::error::{UowError, UowResult};
use crate::unit_of_work::state::{TransactionSlot, UnitOfWorkState};
use futures::future::BoxFuture;
use std::fmt;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use uowkit_session::Session;
use uuid::Uuid;

/// Coordinates one session and at most one transaction on it.
///
/// The unit of work decides who owns a transaction. The call that opens it
/// (the outermost call) is the one that commits or rolls it back; nested
/// calls see an active transaction, ride along, and leave completion to the
/// outer caller. On a session that is not relational every transactional
/// operation is a no-op and saves go straight to the store.
///
/// ## Ownership
///
/// A unit of work owns its session and tears it down on
/// [`dispose`](Self::dispose). All mutating operations take `&mut self`, so
/// one unit is driven by one task at a time. Parallel work uses one unit per
/// task, each with its own session.
///
/// ## Teardown
///
/// [`dispose`](Self::dispose) releases any transaction still held without
/// committing it, then disposes the session. Dropping an undisposed unit
/// runs the same teardown through [`dispose_blocking`](Self::dispose_blocking).
///
/// Dropping blocks the dropping thread. On a current-thread tokio runtime
/// the teardown future is driven in place, so a session whose teardown
/// awaits that runtime's reactor (a pooled network connection, say) never
/// finishes and the drop hangs. Call `dispose().await` before dropping a
/// unit on such a runtime.
pub struct UnitOfWork<S: Session> {
    id: Uuid,
    config: UnitOfWorkConfig,
    session: S,
    slot: TransactionSlot,
}

impl<S: Session> UnitOfWork<S> {
    /// Creates a unit of work over a session with the default configuration.
    pub fn new(session: S) -> Self {
        Self::with_config(session, UnitOfWorkConfig::default())
    }

    /// Creates a unit of work over a session.
    pub fn with_config(session: S, config: UnitOfWorkConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            session,
            slot: TransactionSlot::default(),
        }
    }

    /// Returns the identifier attached to this unit's log events.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &UnitOfWorkConfig {
        &self.config
    }

    /// Returns the session.
    #[must_use]
    pub fn session(&self) -> &S {
        &self.session
    }

    /// Returns the session for staging mutations.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> UnitOfWorkState {
        self.slot.state()
    }

    /// Returns true while this unit holds a transaction.
    #[must_use]
    pub fn has_active_transaction(&self) -> bool {
        self.slot.is_active()
    }

    /// Returns true once the unit has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.slot.is_disposed()
    }

    /// Opens a transaction unless one is already held or the session is
    /// not relational.
    ///
    /// Returns `true` only when this call opened the transaction, in which
    /// case the caller owns it and must commit or roll it back. `false` is
    /// a normal outcome: the caller rides along on someone else's
    /// transaction, or there is no transaction to own.
    ///
    /// # Errors
    ///
    /// Returns the session's error if the transaction cannot be opened,
    /// including cancellation. No transaction is held afterwards.
    pub async fn begin_transaction(&mut self, cancel: &CancellationToken) -> UowResult<bool> {
        self.slot.ensure_usable()?;

        if self.slot.is_active() {
            debug!(uow = %self.id, "reusing active transaction");
            return Ok(false);
        }
        if !self.session.is_relational() {
            debug!(uow = %self.id, "session is not relational, running without a transaction");
            return Ok(false);
        }

        let transaction = self.session.begin_transaction(cancel).await?;
        self.slot.install(transaction);

        debug!(uow = %self.id, label = self.config.label(), "transaction begun");
        Ok(true)
    }

    /// Commits and releases the held transaction.
    ///
    /// Without a held transaction this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the transaction's error. A failed commit leaves the
    /// transaction held, so it can still be rolled back or disposed.
    /// Once the commit succeeds the transaction is no longer held; a failure
    /// to release its handle is then handled by the teardown policy.
    pub async fn commit(&mut self, cancel: &CancellationToken) -> UowResult<()> {
        self.slot.ensure_usable()?;

        let Some(transaction) = self.slot.current_mut() else {
            return Ok(());
        };
        transaction.commit(cancel).await?;

        debug!(uow = %self.id, "transaction committed");
        self.release_completed().await
    }

    /// Rolls back and releases the held transaction.
    ///
    /// Without a held transaction this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the transaction's error. A failed rollback leaves the
    /// transaction held. After a successful rollback, release failures
    /// follow the teardown policy as for [`commit`](Self::commit).
    pub async fn rollback(&mut self) -> UowResult<()> {
        self.slot.ensure_usable()?;

        let Some(transaction) = self.slot.current_mut() else {
            return Ok(());
        };
        transaction.rollback().await?;

        debug!(uow = %self.id, "transaction rolled back");
        self.release_completed().await
    }

    /// Takes the completed transaction out of the slot and disposes it.
    ///
    /// The slot is empty afterwards whatever the dispose returns.
    async fn release_completed(&mut self) -> UowResult<()> {
        let Some(mut transaction) = self.slot.take() else {
            return Ok(());
        };
        let Err(err) = transaction.dispose().await else {
            return Ok(());
        };

        error!(uow = %self.id, error = %err, "failed to release completed transaction");
        match self.config.teardown {
            TeardownPolicy::Propagate => Err(UowError::Teardown {
                failures: vec![err],
            }),
            TeardownPolicy::LogAndContinue => Ok(()),
        }
    }

    /// Flushes the session's pending mutations.
    ///
    /// Returns the number of affected rows. Transaction state is untouched.
    ///
    /// # Errors
    ///
    /// Returns the session's error verbatim.
    pub async fn save_changes(&mut self, cancel: &CancellationToken) -> UowResult<usize> {
        self.slot.ensure_usable()?;
        Ok(self.session.save_changes(cancel).await?)
    }

    /// Runs `operation` inside a transaction owned by the outermost call.
    ///
    /// If this call opened the transaction, it commits when `operation`
    /// succeeds and rolls back when `operation` (or the commit) fails. A
    /// commit that succeeded is never rolled back, even when releasing its
    /// handle fails under [`TeardownPolicy::Propagate`]. If a
    /// transaction was already held, or the session is not relational, the
    /// transaction state is left exactly as it was and any error propagates
    /// to the outer caller.
    ///
    /// `operation` receives the unit itself, so it can stage mutations
    /// through [`session_mut`](Self::session_mut), call
    /// [`save_changes`](Self::save_changes) at any granularity, and nest
    /// further calls to `execute_in_transaction`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use uowkit_core::{UnitOfWork, UowError};
    /// use uowkit_session::{CancellationToken, MemoryStore};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), UowError> {
    /// let store = MemoryStore::relational();
    /// let mut uow = UnitOfWork::new(store.session());
    /// let cancel = CancellationToken::new();
    ///
    /// uow.execute_in_transaction(&cancel, |uow, cancel| {
    ///     Box::pin(async move {
    ///         uow.session_mut().insert("entities", "committed");
    ///         uow.save_changes(&cancel).await?;
    ///         Ok::<_, UowError>(())
    ///     })
    /// })
    /// .await?;
    ///
    /// assert_eq!(store.count("entities"), 1);
    /// # uow.dispose().await
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `operation`'s own error unchanged, or a [`UowError`]
    /// converted into `E` if opening or committing the transaction failed.
    pub async fn execute_in_transaction<T, E, F>(
        &mut self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, E>
    where
        F: for<'u> FnOnce(&'u mut Self, CancellationToken) -> BoxFuture<'u, Result<T, E>> + Send,
        T: Send,
        E: From<UowError> + Send,
    {
        let started_here = self.begin_transaction(cancel).await?;

        let outcome = operation(&mut *self, cancel.clone()).await;
        if !started_here {
            return outcome;
        }

        match outcome {
            Ok(value) => match self.commit(cancel).await {
                Ok(()) => Ok(value),
                Err(err) => {
                    // Still held only when the commit itself failed.
                    if self.slot.is_active() {
                        self.rollback_after_failure().await;
                    }
                    Err(E::from(err))
                }
            },
            Err(err) => {
                self.rollback_after_failure().await;
                Err(err)
            }
        }
    }

    /// Rolls back after a failed operation; the operation's error wins.
    async fn rollback_after_failure(&mut self) {
        if let Err(err) = self.rollback().await {
            error!(
                uow = %self.id,
                error = %err,
                "rollback after failed operation did not complete"
            );
        }
    }

    /// Releases the held transaction without committing it, then disposes
    /// the session.
    ///
    /// Idempotent: later calls return `Ok(())` and do nothing.
    ///
    /// # Errors
    ///
    /// Under [`TeardownPolicy::Propagate`], returns [`UowError::Teardown`]
    /// listing the steps that failed. Every step runs regardless, and the
    /// unit ends disposed either way.
    pub async fn dispose(&mut self) -> UowResult<()> {
        if self.slot.is_disposed() {
            return Ok(());
        }

        let mut failures = Vec::new();

        if let Some(mut transaction) = self.slot.take() {
            warn!(uow = %self.id, "disposing with an open transaction, abandoning it");
            if let Err(err) = transaction.dispose().await {
                error!(uow = %self.id, error = %err, "failed to dispose abandoned transaction");
                failures.push(err);
            }
        }

        if let Err(err) = self.session.dispose().await {
            error!(uow = %self.id, error = %err, "failed to dispose session");
            failures.push(err);
        }

        self.slot.mark_disposed();
        debug!(uow = %self.id, failures = failures.len(), "unit of work disposed");

        match self.config.teardown {
            TeardownPolicy::Propagate if !failures.is_empty() => {
                Err(UowError::Teardown { failures })
            }
            _ => Ok(()),
        }
    }

    /// Runs [`dispose`](Self::dispose) to completion on the calling thread.
    ///
    /// This blocks. Inside a multi-threaded tokio runtime the worker is
    /// handed off with `block_in_place`; anywhere else (no runtime, or a
    /// current-thread runtime) the teardown future is driven in place, which
    /// requires the session's teardown not to depend on that runtime's
    /// reactor. Prefer `dispose().await` wherever an async context exists.
    ///
    /// # Errors
    ///
    /// Same as [`dispose`](Self::dispose).
    pub fn dispose_blocking(&mut self) -> UowResult<()> {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(self.dispose()))
            }
            _ => futures::executor::block_on(self.dispose()),
        }
    }
}

impl<S: Session> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if self.slot.is_disposed() {
            return;
        }
        if let Err(err) = self.dispose_blocking() {
            error!(uow = %self.id, error = %err, "teardown on drop failed");
        }
    }
}

impl<S: Session> fmt::Debug for UnitOfWork<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("label", &self.config.label)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
