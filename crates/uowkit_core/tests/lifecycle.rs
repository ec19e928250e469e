//! Lifecycle tests: ownership, nesting, and teardown of a unit of work.

use uowkit_core::{
    CancellationToken, TeardownPolicy, UnitOfWork, UnitOfWorkConfig, UnitOfWorkState, UowError,
};
use uowkit_testkit::prelude::*;

#[tokio::test]
async fn execute_commits_and_leaves_no_transaction() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work();

    uow.execute_in_transaction(&CancellationToken::new(), |uow, cancel| {
        Box::pin(async move {
            uow.session_mut().insert(ENTITIES, "committed");
            uow.save_changes(&cancel).await?;
            Ok::<_, UowError>(())
        })
    })
    .await
    .unwrap();

    let verification = store.session();
    assert_eq!(verification.count(ENTITIES), 1);
    assert!(!verification.in_transaction());
    assert_eq!(uow.state(), UnitOfWorkState::Idle);
    uow.dispose().await.unwrap();
}

#[tokio::test]
async fn execute_rolls_back_every_save_of_a_failed_operation() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work();

    let result = uow
        .execute_in_transaction(&CancellationToken::new(), |uow, cancel| {
            Box::pin(async move {
                uow.session_mut().insert(ENTITIES, "first");
                uow.save_changes(&cancel).await?;
                uow.session_mut().insert(ENTITIES, "second");
                uow.save_changes(&cancel).await?;
                Err::<(), _>(UowError::from(uowkit_core::SessionError::other(
                    "force rollback",
                )))
            })
        })
        .await;

    assert!(result.is_err());
    assert_eq!(store.count(ENTITIES), 0);
    assert_eq!(store.locked_rows(), 0);
    assert!(!uow.has_active_transaction());
}

#[tokio::test]
async fn nested_executes_only_commit_at_the_outermost_boundary() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work();
    let probe_store = store.clone();

    uow.execute_in_transaction(&CancellationToken::new(), move |uow, cancel| {
        Box::pin(async move {
            uow.session_mut().insert(ENTITIES, "outer");
            uow.save_changes(&cancel).await?;

            uow.execute_in_transaction(&cancel, |uow, cancel| {
                Box::pin(async move {
                    uow.session_mut().insert(ENTITIES, "inner");
                    uow.save_changes(&cancel).await?;
                    Ok::<_, UowError>(())
                })
            })
            .await?;

            // The inner call returned without committing.
            assert!(uow.has_active_transaction());
            assert_eq!(probe_store.count(ENTITIES), 0);
            Ok::<_, UowError>(())
        })
    })
    .await
    .unwrap();

    assert_eq!(store.entity_values(), vec!["outer", "inner"]);
    let stats = store.stats();
    assert_eq!(stats.transactions_begun, 1);
    assert_eq!(stats.commits, 1);
}

#[tokio::test]
async fn failed_inner_execute_rolls_back_the_outer_transaction() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work();

    let result = uow
        .execute_in_transaction(&CancellationToken::new(), |uow, cancel| {
            Box::pin(async move {
                uow.session_mut().insert(ENTITIES, "outer");
                uow.save_changes(&cancel).await?;

                uow.execute_in_transaction(&cancel, |uow, cancel| {
                    Box::pin(async move {
                        uow.session_mut().insert(ENTITIES, "inner");
                        uow.save_changes(&cancel).await?;
                        Err::<(), _>(UowError::from(uowkit_core::SessionError::other(
                            "inner failed",
                        )))
                    })
                })
                .await?;

                Ok::<_, UowError>(())
            })
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "inner failed");
    assert_eq!(store.count(ENTITIES), 0);
    assert_eq!(store.stats().rollbacks, 1);
    assert!(!uow.has_active_transaction());
}

#[tokio::test]
async fn nested_failure_leaves_outer_transaction_to_the_caller() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work();
    let cancel = CancellationToken::new();

    assert!(uow.begin_transaction(&cancel).await.unwrap());
    uow.session_mut().insert(ENTITIES, "kept");
    uow.save_changes(&cancel).await.unwrap();

    let result = uow
        .execute_in_transaction(&cancel, |_uow, _cancel| {
            Box::pin(async {
                Err::<(), _>(UowError::from(uowkit_core::SessionError::other("nested")))
            })
        })
        .await;

    assert!(result.is_err());
    assert!(uow.has_active_transaction());

    // The outer owner decides: here it commits anyway.
    uow.commit(&cancel).await.unwrap();
    assert_eq!(store.entity_values(), vec!["kept"]);
}

#[tokio::test]
async fn nested_begins_only_start_once() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work();
    let cancel = CancellationToken::new();

    let results = [
        uow.begin_transaction(&cancel).await.unwrap(),
        uow.begin_transaction(&cancel).await.unwrap(),
        uow.begin_transaction(&cancel).await.unwrap(),
    ];

    assert_eq!(results, [true, false, false]);
    assert_eq!(store.stats().transactions_begun, 1);
}

#[tokio::test]
async fn non_relational_backend_never_opens_a_transaction() {
    let store = TestStore::non_relational();
    let session = TrackingSession::new(store.session());
    let probe = session.probe();
    let mut uow = UnitOfWork::new(session);
    let cancel = CancellationToken::new();

    assert!(!uow.begin_transaction(&cancel).await.unwrap());
    uow.execute_in_transaction(&cancel, |uow, cancel| {
        Box::pin(async move {
            uow.session_mut().insert(ENTITIES, "inmemory");
            uow.save_changes(&cancel).await?;
            Ok::<_, UowError>(())
        })
    })
    .await
    .unwrap();

    assert_eq!(probe.begins(), 0);
    assert_eq!(probe.commits(), 0);
    assert_eq!(store.count(ENTITIES), 1);
}

#[tokio::test]
async fn commit_releases_the_transaction_exactly_once() {
    let store = TestStore::relational();
    let session = TrackingSession::new(store.session());
    let probe = session.probe();
    let mut uow = UnitOfWork::new(session);
    let cancel = CancellationToken::new();

    uow.begin_transaction(&cancel).await.unwrap();
    uow.commit(&cancel).await.unwrap();
    uow.commit(&cancel).await.unwrap();
    uow.dispose().await.unwrap();

    assert_eq!(probe.commits(), 1);
    assert_eq!(probe.transaction_disposals(), 1);
    assert_eq!(probe.session_disposals(), 1);
}

#[tokio::test]
async fn dispose_async_clears_transaction_and_disposes_session() {
    let store = TestStore::relational();
    let session = TrackingSession::new(store.session());
    let probe = session.probe();
    let mut uow = UnitOfWork::new(session);

    uow.begin_transaction(&CancellationToken::new()).await.unwrap();
    assert!(uow.has_active_transaction());

    uow.dispose().await.unwrap();

    assert!(probe.session_disposed());
    assert!(!uow.has_active_transaction());
    assert_eq!(probe.commits(), 0);
    assert_eq!(probe.rollbacks(), 0);
    assert_eq!(probe.transaction_disposals(), 1);
}

#[test]
fn dispose_blocking_clears_transaction_and_disposes_session() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let store = TestStore::relational();
    let session = TrackingSession::new(store.session());
    let probe = session.probe();
    let mut uow = UnitOfWork::new(session);

    runtime.block_on(async {
        uow.begin_transaction(&CancellationToken::new()).await.unwrap();
    });

    uow.dispose_blocking().unwrap();

    assert!(probe.session_disposed());
    assert!(!uow.has_active_transaction());
    assert_eq!(uow.state(), UnitOfWorkState::Disposed);
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let store = TestStore::relational();
    let session = TrackingSession::new(store.session());
    let probe = session.probe();
    let mut uow = UnitOfWork::new(session);
    uow.begin_transaction(&CancellationToken::new()).await.unwrap();

    uow.dispose().await.unwrap();
    uow.dispose().await.unwrap();
    uow.dispose_blocking().unwrap();
    drop(uow);

    assert_eq!(probe.transaction_disposals(), 1);
    assert_eq!(probe.session_disposals(), 1);
}

#[tokio::test]
async fn dropping_a_cancelled_operation_still_releases_the_transaction() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work();
    let cancel = CancellationToken::new();

    {
        let pending = uow.execute_in_transaction(&cancel, |uow, cancel| {
            Box::pin(async move {
                uow.session_mut().insert(ENTITIES, "never");
                uow.save_changes(&cancel).await?;
                std::future::pending::<()>().await;
                Ok::<_, UowError>(())
            })
        });
        // Poll until the operation parks, then abandon the future.
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(20), pending).await;
        assert!(timed_out.is_err());
    }

    assert!(uow.has_active_transaction());
    assert_eq!(store.locked_rows(), 1);

    drop(uow);

    assert_eq!(store.count(ENTITIES), 0);
    assert_eq!(store.locked_rows(), 0);
    assert_eq!(store.stats().abandoned, 1);
}

#[tokio::test]
async fn configured_unit_keeps_its_label_and_policy() {
    let store = TestStore::relational();
    let mut uow = store.unit_of_work_with(
        UnitOfWorkConfig::new()
            .with_label("orders")
            .with_teardown(TeardownPolicy::Propagate),
    );

    assert_eq!(uow.config().label(), "orders");
    assert_eq!(uow.config().teardown, TeardownPolicy::Propagate);
    assert!(format!("{uow:?}").contains("orders"));

    uow.begin_transaction(&CancellationToken::new()).await.unwrap();
    // Nothing fails during teardown, so even a propagating unit disposes cleanly.
    uow.dispose().await.unwrap();
    assert_eq!(store.stats().abandoned, 1);
}
