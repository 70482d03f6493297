//! Ambient, call-chain-scoped context slots.
//!
//! Two task-local slots carry the active transaction and the acting
//! principal for the current logical call chain. A binding survives await
//! points within its chain and is invisible to every other concurrently
//! running chain.

use std::future::Future;
use std::sync::Arc;

use freightdeck_core::Principal;
use sqlx::{Postgres, Transaction};
use tokio::sync::Mutex;

/// Shared handle to the transaction bound for the current call chain.
///
/// The inner `Option` is taken exactly once by the transaction runner at
/// commit or rollback time; repository calls borrow it for the duration of
/// one statement.
pub type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

tokio::task_local! {
    static CURRENT_TRANSACTION: SharedTransaction;
    static CURRENT_PRINCIPAL: Arc<Principal>;
}

/// Runs `work` with `slot` bound as the ambient transaction for its whole
/// call chain. An inner bind shadows an outer one for the inner chain only.
pub(crate) async fn with_transaction<F>(slot: SharedTransaction, work: F) -> F::Output
where
    F: Future,
{
    CURRENT_TRANSACTION.scope(slot, work).await
}

/// Returns the transaction bound in the current call chain, if any.
///
/// Absence is not an error; callers fall back to the default pool
/// connection.
#[must_use]
pub fn current_transaction() -> Option<SharedTransaction> {
    CURRENT_TRANSACTION.try_with(Clone::clone).ok()
}

/// Runs `work` with `principal` as the ambient acting principal.
pub async fn with_principal<F>(principal: Arc<Principal>, work: F) -> F::Output
where
    F: Future,
{
    CURRENT_PRINCIPAL.scope(principal, work).await
}

/// Returns the principal bound in the current call chain, if any.
///
/// Absence means a trusted system caller.
#[must_use]
pub fn current_principal() -> Option<Arc<Principal>> {
    CURRENT_PRINCIPAL.try_with(Clone::clone).ok()
}
