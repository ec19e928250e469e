//! Stress runners for units of work.
//!
//! These drive many units of work against one shared store to check that
//! every unit ends in a consistent state under concurrency and churn.

use crate::fixtures::ENTITIES;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use uowkit_core::{UnitOfWork, UowError};
use uowkit_session::{CancellationToken, MemoryStore};

/// Configuration for stress runs.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of units of work.
    pub units: usize,
    /// Rows inserted by each unit inside its transaction.
    pub rows_per_unit: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            units: 20,
            rows_per_unit: 1,
        }
    }
}

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Units whose transaction committed.
    pub committed: usize,
    /// Units whose transaction failed and rolled back.
    pub failed: usize,
    /// Units whose task panicked or whose teardown failed. Always zero in a
    /// correct implementation.
    pub errored: usize,
    /// Units that still held a transaction after finishing. Always zero in a
    /// correct implementation.
    pub left_open: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl StressResult {
    /// Returns the total number of units run.
    pub fn total(&self) -> usize {
        self.committed + self.failed + self.errored
    }

    fn record(&mut self, joined: Result<Result<UnitOutcome, UowError>, JoinError>) {
        match joined {
            Ok(Ok(outcome)) => {
                if outcome.committed {
                    self.committed += 1;
                } else {
                    self.failed += 1;
                }
                if outcome.left_open {
                    self.left_open += 1;
                }
            }
            Ok(Err(_)) | Err(_) => self.errored += 1,
        }
    }
}

#[derive(Debug)]
struct UnitOutcome {
    committed: bool,
    left_open: bool,
}

async fn run_unit(store: MemoryStore, unit: usize, rows: usize) -> Result<UnitOutcome, UowError> {
    let mut uow = UnitOfWork::new(store.session());
    let cancel = CancellationToken::new();

    let result = uow
        .execute_in_transaction(&cancel, move |uow, cancel| {
            Box::pin(async move {
                for row in 0..rows {
                    uow.session_mut()
                        .insert(ENTITIES, format!("item-{unit}-{row}"));
                }
                uow.save_changes(&cancel).await?;
                Ok::<_, UowError>(())
            })
        })
        .await;

    let left_open = uow.has_active_transaction();
    uow.dispose().await?;

    Ok(UnitOutcome {
        committed: result.is_ok(),
        left_open,
    })
}

/// Runs `config.units` units of work in parallel, each over its own session
/// of `store`, each inserting `config.rows_per_unit` rows in one transaction.
pub async fn run_concurrent_units(store: &MemoryStore, config: &StressConfig) -> StressResult {
    let start = Instant::now();

    let handles: Vec<_> = (0..config.units)
        .map(|unit| tokio::spawn(run_unit(store.clone(), unit, config.rows_per_unit)))
        .collect();

    let mut result = StressResult {
        committed: 0,
        failed: 0,
        errored: 0,
        left_open: 0,
        duration: Duration::ZERO,
    };
    for handle in handles {
        result.record(handle.await);
    }
    result.duration = start.elapsed();
    result
}

/// Creates, uses, and disposes `iterations` units of work one after another.
///
/// Returns the number of iterations whose transaction committed.
pub async fn run_create_dispose_loop(store: &MemoryStore, iterations: usize) -> usize {
    let mut committed = 0;
    for i in 0..iterations {
        if let Ok(outcome) = run_unit(store.clone(), i, 1).await {
            if outcome.committed && !outcome.left_open {
                committed += 1;
            }
        }
    }
    committed
}
