//! Fault injection for sessions and transactions.
//!
//! A [`FaultySession`] forwards to a real session until a [`FaultPlan`]
//! says a given call should fail. A failing call returns the planned error
//! without reaching the inner session, so the inner state is exactly what it
//! was before the call.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use uowkit_session::{CancellationToken, Session, SessionError, SessionResult, Transaction};

/// A call that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// `Session::begin_transaction`.
    Begin,
    /// `Session::save_changes`.
    Save,
    /// `Session::dispose`.
    SessionDispose,
    /// `Transaction::commit`.
    Commit,
    /// `Transaction::rollback`.
    Rollback,
    /// `Transaction::dispose`.
    TransactionDispose,
}

/// Which calls fail, and with what error.
///
/// Clones share the plan, so a test can arm or clear faults after the
/// session has been handed to a unit of work.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    faults: Arc<Mutex<HashMap<FaultPoint, SessionError>>>,
}

impl FaultPlan {
    /// Creates a plan with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call at `point` fail with `error`.
    pub fn fail(&self, point: FaultPoint, error: SessionError) -> &Self {
        self.faults.lock().insert(point, error);
        self
    }

    /// Lets calls at `point` through again.
    pub fn clear(&self, point: FaultPoint) -> &Self {
        self.faults.lock().remove(&point);
        self
    }

    /// Returns the planned error for `point`, if any.
    pub fn check(&self, point: FaultPoint) -> SessionResult<()> {
        match self.faults.lock().get(&point) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// A session that fails on demand.
#[derive(Debug)]
pub struct FaultySession<S> {
    inner: S,
    plan: FaultPlan,
}

impl<S: Session> FaultySession<S> {
    /// Wraps a session with an empty plan.
    pub fn new(inner: S) -> Self {
        Self::with_plan(inner, FaultPlan::new())
    }

    /// Wraps a session with an existing plan.
    pub fn with_plan(inner: S, plan: FaultPlan) -> Self {
        Self { inner, plan }
    }

    /// Returns the plan shared with this session's transactions.
    pub fn plan(&self) -> FaultPlan {
        self.plan.clone()
    }
}

impl<S> std::ops::Deref for FaultySession<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S> std::ops::DerefMut for FaultySession<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[async_trait]
impl<S: Session> Session for FaultySession<S> {
    fn is_relational(&self) -> bool {
        self.inner.is_relational()
    }

    async fn begin_transaction(
        &mut self,
        cancel: &CancellationToken,
    ) -> SessionResult<Box<dyn Transaction>> {
        self.plan.check(FaultPoint::Begin)?;
        let inner = self.inner.begin_transaction(cancel).await?;
        Ok(Box::new(FaultyTransaction {
            inner,
            plan: self.plan.clone(),
        }))
    }

    async fn save_changes(&mut self, cancel: &CancellationToken) -> SessionResult<usize> {
        self.plan.check(FaultPoint::Save)?;
        self.inner.save_changes(cancel).await
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        self.plan.check(FaultPoint::SessionDispose)?;
        self.inner.dispose().await
    }
}

struct FaultyTransaction {
    inner: Box<dyn Transaction>,
    plan: FaultPlan,
}

#[async_trait]
impl Transaction for FaultyTransaction {
    async fn commit(&mut self, cancel: &CancellationToken) -> SessionResult<()> {
        self.plan.check(FaultPoint::Commit)?;
        self.inner.commit(cancel).await
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        self.plan.check(FaultPoint::Rollback)?;
        self.inner.rollback().await
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        self.plan.check(FaultPoint::TransactionDispose)?;
        self.inner.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uowkit_session::MemoryStore;

    #[tokio::test]
    async fn planned_save_failure_leaves_pending_mutations() {
        let store = MemoryStore::relational();
        let mut session = FaultySession::new(store.session());
        session.plan().fail(FaultPoint::Save, SessionError::other("save failed"));

        session.insert("entities", "will-fail");
        let err = session
            .save_changes(&CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, SessionError::other("save failed"));
        assert_eq!(session.pending_count(), 1);
        assert_eq!(store.count("entities"), 0);
    }

    #[tokio::test]
    async fn cleared_fault_lets_calls_through() {
        let store = MemoryStore::relational();
        let plan = FaultPlan::new();
        let mut session = FaultySession::with_plan(store.session(), plan.clone());
        let cancel = CancellationToken::new();

        plan.fail(FaultPoint::Commit, SessionError::other("commit failed"));
        let mut txn = session.begin_transaction(&cancel).await.unwrap();
        assert!(txn.commit(&cancel).await.is_err());

        plan.clear(FaultPoint::Commit);
        txn.commit(&cancel).await.unwrap();
        assert_eq!(store.stats().commits, 1);
    }
}
