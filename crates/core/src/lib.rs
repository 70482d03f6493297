//! Shared primitives for all Rust crates in Freightdeck.

#![forbid(unsafe_code)]

/// Principal and role primitives shared across services.
pub mod auth;
/// Permission grants and the pure allow/deny evaluator.
pub mod permission;

use thiserror::Error;

pub use auth::{Principal, Role};
pub use permission::{GrantAction, Pattern, PermissionGrant, grants_for, has_permission};

/// Result type used across Freightdeck crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but lacks a grant for the attempted write.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A narrowed update did not match its precondition clause.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// A transaction did not complete within its time budget.
    #[error("transaction timeout: {0}")]
    TransactionTimeout(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
