//! Connection handle and bounded-lifetime transaction execution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use freightdeck_core::{AppError, AppResult, Principal};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::debug;

use crate::activity::ActivityRecorder;
use crate::context;
use crate::repository::{Record, Repository, RepositoryConfig};

/// Upper bound on the lifetime of one ambient transaction.
pub const DEFAULT_TRANSACTION_BUDGET: Duration = Duration::from_secs(30);

/// Entry point of the data layer, shared by all requests.
///
/// It hands out [`Repository`] instances wired to the shared pool and runs
/// multi-step work inside a single transaction bound as ambient context.
#[derive(Clone)]
pub struct Datastore {
    pool: PgPool,
    system_principal: Arc<Principal>,
}

impl Datastore {
    /// Creates a datastore on `pool`, attributing unattended mutations to
    /// `system_principal` in the audit trail.
    #[must_use]
    pub fn new(pool: PgPool, system_principal: Principal) -> Self {
        Self {
            pool,
            system_principal: Arc::new(system_principal),
        }
    }

    /// Returns the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Builds a repository for `R` with `config`, wired to the shared pool
    /// and the audit recorder.
    #[must_use]
    pub fn repository<R: Record>(&self, config: RepositoryConfig) -> Repository<R> {
        let recorder = ActivityRecorder::new(self.pool.clone(), Arc::clone(&self.system_principal));
        Repository::new(self.pool.clone(), config, Some(recorder))
    }

    /// Runs `work` inside one transaction with the default budget.
    ///
    /// See [`Datastore::run_in_transaction_with_budget`].
    pub async fn run_in_transaction<T, F, Fut>(&self, work: F) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.run_in_transaction_with_budget(work, DEFAULT_TRANSACTION_BUDGET)
            .await
    }

    /// Runs `work` inside one transaction bound as the ambient transaction
    /// of its call chain, committing on success and rolling back on error
    /// or when `budget` elapses.
    ///
    /// Every repository call made inside `work`, at any call depth, joins
    /// this transaction. A timed-out `work` future is dropped before the
    /// rollback, so no statement of it can land after the outcome is
    /// decided.
    pub async fn run_in_transaction_with_budget<T, F, Fut>(
        &self,
        work: F,
        budget: Duration,
    ) -> AppResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to open transaction: {error}")))?;
        let slot: context::SharedTransaction = Arc::new(Mutex::new(Some(transaction)));

        let outcome = tokio::time::timeout(
            budget,
            context::with_transaction(Arc::clone(&slot), work()),
        )
        .await;

        // The work future has completed or been dropped by now, so the
        // lock is uncontended and the handle is taken exactly once.
        let transaction = slot.lock().await.take().ok_or_else(|| {
            AppError::Internal("transaction slot was emptied before completion".to_owned())
        })?;

        match outcome {
            Ok(Ok(value)) => {
                transaction.commit().await.map_err(|error| {
                    AppError::Internal(format!("failed to commit transaction: {error}"))
                })?;
                Ok(value)
            }
            Ok(Err(work_error)) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    debug!(%rollback_error, "rollback after failed work did not complete");
                }
                Err(work_error)
            }
            Err(_elapsed) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    debug!(%rollback_error, "rollback after timeout did not complete");
                }
                Err(AppError::TransactionTimeout(format!(
                    "transaction exceeded its {}ms budget",
                    budget.as_millis()
                )))
            }
        }
    }
}
