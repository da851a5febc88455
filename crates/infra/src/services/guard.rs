use std::sync::Arc;

use tracing::instrument;

use terra_auth::{Action, Decision, Resource, authorize};

use super::{Actor, ServiceError};
use crate::store::CredentialStore;

/// Runs the permission check for a verified caller.
///
/// Privileged callers pass without a store read. Everyone else is checked
/// against the matrix as persisted right now, never against token contents,
/// so an approval is visible on the very next request.
#[derive(Clone)]
pub struct PermissionGuard {
    credentials: Arc<dyn CredentialStore>,
}

impl PermissionGuard {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    #[instrument(skip(self, actor), fields(principal_id = %actor.id, %resource, %action))]
    pub async fn check(&self, actor: &Actor, resource: Resource, action: Action) -> Result<Decision, ServiceError> {
        if actor.role.is_privileged() {
            return Ok(Decision::Bypass);
        }

        // A token for a principal that no longer exists is an authentication failure.
        let principal = self
            .credentials
            .get(actor.id)
            .await?
            .ok_or(ServiceError::Unauthenticated)?;

        authorize(actor.role, &principal.permissions, resource, action).map_err(|err| {
            tracing::info!(error = %err, "permission denied");
            ServiceError::Forbidden(err)
        })
    }
}
