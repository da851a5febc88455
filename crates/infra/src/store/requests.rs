use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::instrument;
use uuid::Uuid;

use terra_auth::{DecisionClaim, PermissionRequest, RequestDecision};
use terra_core::{PermissionRequestId, PrincipalId};

use super::StoreError;

/// Permission requests and their conditional state transitions.
///
/// `claim`, `complete` and `release` are each a single conditional update;
/// two concurrent `claim` calls on one request cannot both succeed.
#[async_trait]
pub trait PermissionRequestStore: Send + Sync {
    async fn insert(&self, request: PermissionRequest) -> Result<(), StoreError>;

    async fn get(&self, id: PermissionRequestId) -> Result<Option<PermissionRequest>, StoreError>;

    /// Newest first.
    async fn list_for_principal(&self, principal_id: PrincipalId) -> Result<Vec<PermissionRequest>, StoreError>;

    /// PENDING requests, newest first.
    async fn list_pending(&self) -> Result<Vec<PermissionRequest>, StoreError>;

    async fn mark_read(&self, id: PermissionRequestId, now: DateTime<Utc>) -> Result<PermissionRequest, StoreError>;

    /// Take the exclusive claim to decide a PENDING request as `decision`.
    async fn claim(
        &self,
        id: PermissionRequestId,
        now: DateTime<Utc>,
        lease: Duration,
        decision: RequestDecision,
    ) -> Result<(PermissionRequest, DecisionClaim), StoreError>;

    /// Record the verdict, only while `token` still holds the claim.
    async fn complete(
        &self,
        id: PermissionRequestId,
        token: Uuid,
        decision: RequestDecision,
        decided_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<PermissionRequest, StoreError>;

    /// Drop the claim if `token` still holds it.
    async fn release(&self, id: PermissionRequestId, token: Uuid) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> PermissionRequestStore for Arc<S>
where
    S: PermissionRequestStore + ?Sized,
{
    async fn insert(&self, request: PermissionRequest) -> Result<(), StoreError> {
        (**self).insert(request).await
    }

    async fn get(&self, id: PermissionRequestId) -> Result<Option<PermissionRequest>, StoreError> {
        (**self).get(id).await
    }

    async fn list_for_principal(&self, principal_id: PrincipalId) -> Result<Vec<PermissionRequest>, StoreError> {
        (**self).list_for_principal(principal_id).await
    }

    async fn list_pending(&self) -> Result<Vec<PermissionRequest>, StoreError> {
        (**self).list_pending().await
    }

    async fn mark_read(&self, id: PermissionRequestId, now: DateTime<Utc>) -> Result<PermissionRequest, StoreError> {
        (**self).mark_read(id, now).await
    }

    async fn claim(
        &self,
        id: PermissionRequestId,
        now: DateTime<Utc>,
        lease: Duration,
        decision: RequestDecision,
    ) -> Result<(PermissionRequest, DecisionClaim), StoreError> {
        (**self).claim(id, now, lease, decision).await
    }

    async fn complete(
        &self,
        id: PermissionRequestId,
        token: Uuid,
        decision: RequestDecision,
        decided_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<PermissionRequest, StoreError> {
        (**self).complete(id, token, decision, decided_by, now).await
    }

    async fn release(&self, id: PermissionRequestId, token: Uuid) -> Result<(), StoreError> {
        (**self).release(id, token).await
    }
}

/// In-memory request store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPermissionRequestStore {
    inner: RwLock<HashMap<PermissionRequestId, PermissionRequest>>,
}

impl InMemoryPermissionRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect<F>(&self, pred: F) -> Result<Vec<PermissionRequest>, StoreError>
    where
        F: Fn(&PermissionRequest) -> bool,
    {
        let map = self.inner.read().map_err(|_| StoreError::poisoned())?;
        let mut out: Vec<PermissionRequest> = map.values().filter(|r| pred(r)).cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    fn modify<T, F>(&self, id: PermissionRequestId, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut PermissionRequest) -> Result<T, StoreError>,
    {
        let mut map = self.inner.write().map_err(|_| StoreError::poisoned())?;
        let request = map.get_mut(&id).ok_or(StoreError::NotFound("permission request"))?;
        f(request)
    }
}

#[async_trait]
impl PermissionRequestStore for InMemoryPermissionRequestStore {
    #[instrument(skip(self, request), fields(request_id = %request.id, principal_id = %request.principal_id), err)]
    async fn insert(&self, request: PermissionRequest) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(|_| StoreError::poisoned())?;
        if map.contains_key(&request.id) {
            return Err(StoreError::Conflict(format!("permission request {} already exists", request.id)));
        }
        map.insert(request.id, request);
        Ok(())
    }

    async fn get(&self, id: PermissionRequestId) -> Result<Option<PermissionRequest>, StoreError> {
        let map = self.inner.read().map_err(|_| StoreError::poisoned())?;
        Ok(map.get(&id).cloned())
    }

    async fn list_for_principal(&self, principal_id: PrincipalId) -> Result<Vec<PermissionRequest>, StoreError> {
        self.collect(|r| r.principal_id == principal_id)
    }

    async fn list_pending(&self) -> Result<Vec<PermissionRequest>, StoreError> {
        self.collect(PermissionRequest::is_pending)
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn mark_read(&self, id: PermissionRequestId, now: DateTime<Utc>) -> Result<PermissionRequest, StoreError> {
        self.modify(id, |r| {
            r.mark_read(now);
            Ok(r.clone())
        })
    }

    #[instrument(skip(self), fields(request_id = %id, decision = ?decision), err)]
    async fn claim(
        &self,
        id: PermissionRequestId,
        now: DateTime<Utc>,
        lease: Duration,
        decision: RequestDecision,
    ) -> Result<(PermissionRequest, DecisionClaim), StoreError> {
        self.modify(id, |r| {
            let claim = r.claim(now, lease, decision)?;
            Ok((r.clone(), claim))
        })
    }

    #[instrument(skip(self, token), fields(request_id = %id, decision = ?decision), err)]
    async fn complete(
        &self,
        id: PermissionRequestId,
        token: Uuid,
        decision: RequestDecision,
        decided_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<PermissionRequest, StoreError> {
        self.modify(id, |r| {
            r.complete(token, decision, decided_by, now)?;
            Ok(r.clone())
        })
    }

    #[instrument(skip(self, token), fields(request_id = %id), err)]
    async fn release(&self, id: PermissionRequestId, token: Uuid) -> Result<(), StoreError> {
        self.modify(id, |r| {
            r.release(token);
            Ok(())
        })
    }
}
