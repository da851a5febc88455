//! Persistence seams for principals and permission requests.
//!
//! Each store is a trait with two implementations: an in-memory one for
//! dev/tests and a Postgres one. Multi-step mutations (matrix merge, decision
//! claim, reset-token consumption) are single atomic operations on the store,
//! never read-then-write sequences in the caller.

pub mod credentials;
pub mod postgres;
pub mod requests;

pub use credentials::{CredentialStore, InMemoryCredentialStore};
pub use postgres::{PostgresCredentialStore, PostgresPermissionRequestStore, apply_schema};
pub use requests::{InMemoryPermissionRequestStore, PermissionRequestStore};

use thiserror::Error;

use terra_auth::WorkflowError;
use terra_core::DomainError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique constraint violated (username/email already taken).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A conditional transition on a permission request was refused.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Mutation rejected by the record's own validation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        StoreError::Backend("store lock poisoned".to_string())
    }
}
