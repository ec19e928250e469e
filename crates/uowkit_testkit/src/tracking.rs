//! Session wrappers that record lifecycle calls.
//!
//! Used to observe what a unit of work does to its collaborators: how many
//! times it disposed a transaction or a session, and whether it committed or
//! rolled back.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uowkit_session::{CancellationToken, Session, SessionResult, Transaction};

#[derive(Debug, Default)]
struct Counts {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    transaction_disposals: AtomicUsize,
    session_disposals: AtomicUsize,
}

/// Shared view of the calls made through a [`TrackingSession`].
///
/// Clones observe the same counters, so a test can keep a probe after
/// handing the session to a unit of work.
#[derive(Debug, Clone, Default)]
pub struct LifecycleProbe {
    counts: Arc<Counts>,
}

impl LifecycleProbe {
    /// Transactions opened through the session.
    pub fn begins(&self) -> usize {
        self.counts.begins.load(Ordering::SeqCst)
    }

    /// Successful commits.
    pub fn commits(&self) -> usize {
        self.counts.commits.load(Ordering::SeqCst)
    }

    /// Successful rollbacks.
    pub fn rollbacks(&self) -> usize {
        self.counts.rollbacks.load(Ordering::SeqCst)
    }

    /// Calls to `Transaction::dispose`, successful or not.
    pub fn transaction_disposals(&self) -> usize {
        self.counts.transaction_disposals.load(Ordering::SeqCst)
    }

    /// Calls to `Session::dispose`, successful or not.
    pub fn session_disposals(&self) -> usize {
        self.counts.session_disposals.load(Ordering::SeqCst)
    }

    /// Returns true once the session has been asked to dispose.
    pub fn session_disposed(&self) -> bool {
        self.session_disposals() > 0
    }
}

/// A session that counts lifecycle calls before forwarding them.
#[derive(Debug)]
pub struct TrackingSession<S> {
    inner: S,
    probe: LifecycleProbe,
}

impl<S: Session> TrackingSession<S> {
    /// Wraps a session.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            probe: LifecycleProbe::default(),
        }
    }

    /// Returns a probe over this session's counters.
    pub fn probe(&self) -> LifecycleProbe {
        self.probe.clone()
    }
}

impl<S> std::ops::Deref for TrackingSession<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<S> std::ops::DerefMut for TrackingSession<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[async_trait]
impl<S: Session> Session for TrackingSession<S> {
    fn is_relational(&self) -> bool {
        self.inner.is_relational()
    }

    async fn begin_transaction(
        &mut self,
        cancel: &CancellationToken,
    ) -> SessionResult<Box<dyn Transaction>> {
        let inner = self.inner.begin_transaction(cancel).await?;
        self.probe.counts.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackingTransaction {
            inner,
            probe: self.probe.clone(),
        }))
    }

    async fn save_changes(&mut self, cancel: &CancellationToken) -> SessionResult<usize> {
        self.inner.save_changes(cancel).await
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        self.probe
            .counts
            .session_disposals
            .fetch_add(1, Ordering::SeqCst);
        self.inner.dispose().await
    }
}

struct TrackingTransaction {
    inner: Box<dyn Transaction>,
    probe: LifecycleProbe,
}

#[async_trait]
impl Transaction for TrackingTransaction {
    async fn commit(&mut self, cancel: &CancellationToken) -> SessionResult<()> {
        self.inner.commit(cancel).await?;
        self.probe.counts.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> SessionResult<()> {
        self.inner.rollback().await?;
        self.probe.counts.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&mut self) -> SessionResult<()> {
        self.probe
            .counts
            .transaction_disposals
            .fetch_add(1, Ordering::SeqCst);
        self.inner.dispose().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uowkit_session::MemoryStore;

    #[tokio::test]
    async fn counts_forwarded_calls() {
        let store = MemoryStore::relational();
        let mut session = TrackingSession::new(store.session());
        let probe = session.probe();
        let cancel = CancellationToken::new();

        let mut txn = session.begin_transaction(&cancel).await.unwrap();
        txn.commit(&cancel).await.unwrap();
        txn.dispose().await.unwrap();
        session.dispose().await.unwrap();

        assert_eq!(probe.begins(), 1);
        assert_eq!(probe.commits(), 1);
        assert_eq!(probe.rollbacks(), 0);
        assert_eq!(probe.transaction_disposals(), 1);
        assert!(probe.session_disposed());
        assert_eq!(store.stats().commits, 1);
    }

    #[tokio::test]
    async fn derefs_to_inner_session() {
        let store = MemoryStore::relational();
        let mut session = TrackingSession::new(store.session());

        session.insert("entities", "through-deref");
        assert_eq!(session.pending_count(), 1);
    }
}
