use thiserror::Error;

use terra_auth::{AuthzError, PasswordError, TokenError, WorkflowError};
use terra_core::DomainError;

use crate::store::StoreError;

/// Application-level failure, one variant per outward error kind.
///
/// Messages on `Unauthenticated`, `InvalidCredentials` and `InvalidResetToken`
/// are deliberately fixed so callers cannot tell causes apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid or expired token")]
    InvalidResetToken,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { .. } | DomainError::InvalidId(_) => ServiceError::Validation(err.to_string()),
            DomainError::NotFound(what) => ServiceError::NotFound(what),
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl From<WorkflowError> for ServiceError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::EmptyPatch => ServiceError::Validation(err.to_string()),
            WorkflowError::AlreadyDecided(_) | WorkflowError::InterruptedApproval => {
                ServiceError::Conflict(err.to_string())
            }
            // A racing decider loses the same way as a late one.
            WorkflowError::DecisionInProgress | WorkflowError::ClaimLost => {
                ServiceError::Conflict("request already decided".to_string())
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Workflow(e) => e.into(),
            StoreError::Domain(e) => e.into(),
            StoreError::Backend(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => ServiceError::InvalidCredentials,
            PasswordError::Hash(_) | PasswordError::MalformedHash(_) => ServiceError::Internal(err.to_string()),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => ServiceError::Internal(msg),
            TokenError::Invalid(_) | TokenError::Claims(_) => ServiceError::Unauthenticated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terra_auth::RequestStatus;

    #[test]
    fn workflow_races_surface_as_conflict() {
        for err in [
            WorkflowError::AlreadyDecided(RequestStatus::Approved),
            WorkflowError::DecisionInProgress,
            WorkflowError::ClaimLost,
            WorkflowError::InterruptedApproval,
        ] {
            assert!(matches!(ServiceError::from(err), ServiceError::Conflict(_)));
        }
    }

    #[test]
    fn validation_message_names_the_field() {
        let err = ServiceError::from(StoreError::Domain(DomainError::validation("phone", "is required")));
        assert_eq!(err, ServiceError::Validation("phone: is required".into()));
    }

    #[test]
    fn backend_failures_are_internal() {
        let err = ServiceError::from(StoreError::Backend("pool closed".into()));
        assert!(matches!(err, ServiceError::Internal(_)));
    }
}
