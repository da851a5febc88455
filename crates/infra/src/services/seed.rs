use chrono::Utc;
use tracing::instrument;

use terra_auth::{Principal, Role, Signup, hash_password};
use terra_core::PrincipalId;

use super::ServiceError;
use crate::config::BootstrapAdmin;
use crate::store::{CredentialStore, StoreError};

/// Create the bootstrap administrator unless the username is already taken.
///
/// Returns the new principal's id, or `None` when seeding was skipped.
#[instrument(skip_all, fields(username = %admin.username), err)]
pub async fn seed_admin(
    credentials: &dyn CredentialStore,
    admin: &BootstrapAdmin,
) -> Result<Option<PrincipalId>, ServiceError> {
    if credentials.find_by_username(admin.username.trim()).await?.is_some() {
        tracing::info!("bootstrap admin already present, skipping");
        return Ok(None);
    }

    let signup = Signup {
        first_name: "System".to_string(),
        last_name: "Administrator".to_string(),
        username: admin.username.clone(),
        email: admin.email.clone(),
        phone: "n/a".to_string(),
        password: admin.password.clone(),
        profile_image_path: None,
    }
    .validated()?;

    let password = signup.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ServiceError::Internal(format!("hashing task failed: {e}")))??;

    let mut principal = Principal::register(&signup, password_hash, Utc::now());
    principal.role = Role::Admin;
    let id = principal.id;

    match credentials.insert(principal).await {
        Ok(()) => {
            tracing::info!(principal_id = %id, "bootstrap admin created");
            Ok(Some(id))
        }
        // Lost a race with another instance, or the email belongs to someone else.
        Err(StoreError::Conflict(msg)) => {
            tracing::warn!(reason = %msg, "bootstrap admin not created");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}
