use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use terra_auth::{AdminUpdate, PermissionPatch, Principal, ProfileUpdate, ResetState};
use terra_core::PrincipalId;

use super::StoreError;

/// Principal records: identity, password hash, role and permission matrix.
///
/// Every `update_*`/`merge_*`/`consume_*` method is an atomic read-modify-write
/// on a single record; callers never hold a record across awaits and write it
/// back.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with [`StoreError::Conflict`] if username or email is taken.
    async fn insert(&self, principal: Principal) -> Result<(), StoreError>;

    async fn get(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError>;

    /// `email` must already be normalized (trimmed, lowercased).
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError>;

    /// All principals, newest first.
    async fn list(&self) -> Result<Vec<Principal>, StoreError>;

    async fn update_profile(
        &self,
        id: PrincipalId,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError>;

    async fn admin_update(
        &self,
        id: PrincipalId,
        update: AdminUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError>;

    /// Set every granted cell of `patch` on the live matrix. Never clears a cell.
    async fn merge_permissions(
        &self,
        id: PrincipalId,
        patch: &PermissionPatch,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError>;

    /// Replace any outstanding reset token.
    async fn set_reset_token(&self, id: PrincipalId, reset: ResetState) -> Result<(), StoreError>;

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, StoreError>;

    /// Swap in `new_password_hash` and clear the token, only if `token_hash`
    /// matches an unexpired token. Returns the principal whose password changed.
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        new_password_hash: String,
    ) -> Result<Option<PrincipalId>, StoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn insert(&self, principal: Principal) -> Result<(), StoreError> {
        (**self).insert(principal).await
    }

    async fn get(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        (**self).get(id).await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        (**self).find_by_username(username).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        (**self).find_by_email(email).await
    }

    async fn list(&self) -> Result<Vec<Principal>, StoreError> {
        (**self).list().await
    }

    async fn update_profile(
        &self,
        id: PrincipalId,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        (**self).update_profile(id, update, now).await
    }

    async fn admin_update(
        &self,
        id: PrincipalId,
        update: AdminUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        (**self).admin_update(id, update, now).await
    }

    async fn merge_permissions(
        &self,
        id: PrincipalId,
        patch: &PermissionPatch,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        (**self).merge_permissions(id, patch, now).await
    }

    async fn set_reset_token(&self, id: PrincipalId, reset: ResetState) -> Result<(), StoreError> {
        (**self).set_reset_token(id, reset).await
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, StoreError> {
        (**self).find_by_reset_token(token_hash, now).await
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        new_password_hash: String,
    ) -> Result<Option<PrincipalId>, StoreError> {
        (**self).consume_reset_token(token_hash, now, new_password_hash).await
    }
}

/// In-memory credential store for tests/dev.
///
/// A single `RwLock` over the map makes each method one critical section,
/// which is what gives the read-modify-write methods their atomicity.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<HashMap<PrincipalId, Principal>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_by<F>(&self, pred: F) -> Result<Option<Principal>, StoreError>
    where
        F: Fn(&Principal) -> bool,
    {
        let map = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(map.values().find(|p| pred(p)).cloned())
    }

    fn modify<F>(&self, id: PrincipalId, f: F) -> Result<Principal, StoreError>
    where
        F: FnOnce(&mut Principal) -> Result<(), StoreError>,
    {
        let mut map = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let current = map.get(&id).ok_or(StoreError::NotFound("principal"))?;

        // Mutate a copy so a rejected update leaves the record untouched.
        let mut next = current.clone();
        f(&mut next)?;
        map.insert(id, next.clone());
        Ok(next)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    #[instrument(skip(self, principal), fields(principal_id = %principal.id), err)]
    async fn insert(&self, principal: Principal) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::poisoned())?;

        if map.values().any(|p| p.username == principal.username) {
            return Err(StoreError::Conflict("username already in use".to_string()));
        }
        if map.values().any(|p| p.email == principal.email) {
            return Err(StoreError::Conflict("email already in use".to_string()));
        }

        map.insert(principal.id, principal);
        Ok(())
    }

    async fn get(&self, id: PrincipalId) -> Result<Option<Principal>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(map.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Principal>, StoreError> {
        self.find_by(|p| p.username == username)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StoreError> {
        self.find_by(|p| p.email == email)
    }

    async fn list(&self) -> Result<Vec<Principal>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::poisoned())?;
        let mut all: Vec<Principal> = map.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(all)
    }

    #[instrument(skip(self, update), fields(principal_id = %id), err)]
    async fn update_profile(
        &self,
        id: PrincipalId,
        update: ProfileUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        self.modify(id, |p| Ok(p.apply_profile_update(update, now)?))
    }

    #[instrument(skip(self, update), fields(principal_id = %id), err)]
    async fn admin_update(
        &self,
        id: PrincipalId,
        update: AdminUpdate,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        self.modify(id, |p| Ok(p.apply_admin_update(update, now)?))
    }

    #[instrument(skip(self, patch), fields(principal_id = %id), err)]
    async fn merge_permissions(
        &self,
        id: PrincipalId,
        patch: &PermissionPatch,
        now: DateTime<Utc>,
    ) -> Result<Principal, StoreError> {
        self.modify(id, |p| {
            if !p.permissions.merge_grants(patch).is_empty() {
                p.updated_at = now;
            }
            Ok(())
        })
    }

    #[instrument(skip(self, reset), fields(principal_id = %id), err)]
    async fn set_reset_token(&self, id: PrincipalId, reset: ResetState) -> Result<(), StoreError> {
        self.modify(id, |p| {
            p.reset = Some(reset);
            Ok(())
        })
        .map(|_| ())
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, StoreError> {
        self.find_by(|p| p.reset.as_ref().is_some_and(|r| r.accepts(token_hash, now)))
    }

    #[instrument(skip_all, err)]
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
        new_password_hash: String,
    ) -> Result<Option<PrincipalId>, StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::poisoned())?;

        let Some(principal) = map
            .values_mut()
            .find(|p| p.reset.as_ref().is_some_and(|r| r.accepts(token_hash, now)))
        else {
            return Ok(None);
        };

        principal.password_hash = new_password_hash;
        principal.reset = None;
        principal.updated_at = now;
        Ok(Some(principal.id))
    }
}
