//! Permission-enforcing, transaction-aware data access for Freightdeck.
//!
//! The request layer resolves a [`Principal`](freightdeck_core::Principal),
//! binds it with [`with_principal`], and calls [`Repository`] operations,
//! optionally inside [`Datastore::run_in_transaction`]. Nested repository
//! calls join the enclosing transaction through ambient context instead of
//! threading a handle through every signature.

#![forbid(unsafe_code)]

/// Audit trail written after successful mutations.
pub mod activity;
/// Ambient, call-chain-scoped context slots.
pub mod context;
/// Typed criteria and bound SQL values.
pub mod criteria;
/// Concrete resource shapes for the administered domain.
pub mod records;
/// The generic resource repository.
pub mod repository;
/// Connection handle and bounded-lifetime transaction execution.
pub mod runner;

pub use activity::{ActivityAction, ActivityRecorder};
pub use context::{SharedTransaction, current_principal, current_transaction, with_principal};
pub use criteria::{Criteria, ListQuery, Sort, SortDirection, SqlValue};
pub use repository::{InsertRecord, NoUpdate, Record, Repository, RepositoryConfig, UpdateRecord};
pub use runner::{DEFAULT_TRANSACTION_BUDGET, Datastore};
