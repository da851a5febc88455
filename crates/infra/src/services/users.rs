use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use terra_auth::{AdminUpdate, PrincipalProfile, ProfileUpdate, require_admin};
use terra_core::PrincipalId;

use super::{Actor, ServiceError};
use crate::store::{CredentialStore, StoreError};

/// Profile self-service and administrator user management.
#[derive(Clone)]
pub struct UserAdminService {
    credentials: Arc<dyn CredentialStore>,
}

impl UserAdminService {
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    pub async fn own_profile(&self, actor: &Actor) -> Result<PrincipalProfile, ServiceError> {
        self.credentials
            .get(actor.id)
            .await?
            .map(|p| p.profile())
            .ok_or(ServiceError::Unauthenticated)
    }

    /// Non-privileged fields only; role and matrix are not part of [`ProfileUpdate`].
    #[instrument(skip(self, actor, update), fields(principal_id = %actor.id), err)]
    pub async fn update_own_profile(
        &self,
        actor: &Actor,
        update: ProfileUpdate,
    ) -> Result<PrincipalProfile, ServiceError> {
        match self.credentials.update_profile(actor.id, update, Utc::now()).await {
            Ok(p) => Ok(p.profile()),
            Err(StoreError::NotFound(_)) => Err(ServiceError::Unauthenticated),
            Err(err) => Err(err.into()),
        }
    }

    /// Newest first.
    pub async fn list(&self, actor: &Actor) -> Result<Vec<PrincipalProfile>, ServiceError> {
        require_admin(actor.role)?;
        let all = self.credentials.list().await?;
        Ok(all.iter().map(|p| p.profile()).collect())
    }

    /// Administrator edit. A supplied matrix replaces the current one wholesale.
    #[instrument(skip(self, actor, update), fields(principal_id = %actor.id, target_id = %id), err)]
    pub async fn update(
        &self,
        actor: &Actor,
        id: PrincipalId,
        update: AdminUpdate,
    ) -> Result<PrincipalProfile, ServiceError> {
        require_admin(actor.role)?;

        let role_change = update.role;
        let matrix_change = update.permissions.is_some();
        let updated = self.credentials.admin_update(id, update, Utc::now()).await?;

        if role_change.is_some() || matrix_change {
            tracing::info!(role = %updated.role, matrix_replaced = matrix_change, "principal privileges edited");
        }
        Ok(updated.profile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::seeded;
    use crate::store::InMemoryCredentialStore;
    use terra_auth::{Action, AuthzError, PermissionMatrix, Resource, Role};

    #[tokio::test]
    async fn self_edit_changes_profile_only() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let service = UserAdminService::new(store.clone());
        let user = seeded(&store, "user", Role::User).await;

        let update: ProfileUpdate = serde_json::from_value(serde_json::json!({
            "firstName": "Yael",
            "role": "ADMIN",
            "permissions": { "cities": { "delete": true } }
        }))
        .unwrap();
        let profile = service.update_own_profile(&user, update).await.unwrap();

        assert_eq!(profile.first_name, "Yael");
        assert_eq!(profile.role, Role::User);
        assert!(!profile.permissions.allows(Resource::Cities, Action::Delete));
    }

    #[tokio::test]
    async fn invalid_self_edit_is_a_validation_error() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let service = UserAdminService::new(store.clone());
        let user = seeded(&store, "user", Role::User).await;

        let update = ProfileUpdate {
            last_name: Some("x".into()),
            ..Default::default()
        };
        assert!(matches!(
            service.update_own_profile(&user, update).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn admin_can_list_and_edit() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let service = UserAdminService::new(store.clone());
        let admin = seeded(&store, "admin", Role::Admin).await;
        let user = seeded(&store, "user", Role::User).await;

        assert_eq!(service.list(&admin).await.unwrap().len(), 2);

        let mut matrix = PermissionMatrix::default();
        matrix.set(Resource::Cities, Action::Update, true);
        let update = AdminUpdate {
            permissions: Some(matrix),
            ..Default::default()
        };
        let edited = service.update(&admin, user.id, update).await.unwrap();
        assert_eq!(edited.permissions, matrix);
    }

    #[tokio::test]
    async fn standard_principal_cannot_administer() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let service = UserAdminService::new(store.clone());
        let user = seeded(&store, "user", Role::User).await;

        assert_eq!(
            service.list(&user).await.unwrap_err(),
            ServiceError::Forbidden(AuthzError::AdminRequired)
        );
        let promote = AdminUpdate {
            role: Some(Role::Admin),
            ..Default::default()
        };
        assert_eq!(
            service.update(&user, user.id, promote).await.unwrap_err(),
            ServiceError::Forbidden(AuthzError::AdminRequired)
        );
        assert_eq!(store.get(user.id).await.unwrap().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn editing_unknown_principal_is_not_found() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let service = UserAdminService::new(store.clone());
        let admin = seeded(&store, "admin", Role::Admin).await;

        assert_eq!(
            service
                .update(&admin, PrincipalId::new(), AdminUpdate::default())
                .await
                .unwrap_err(),
            ServiceError::NotFound("principal")
        );
    }
}
