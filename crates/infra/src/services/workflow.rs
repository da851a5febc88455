//! Permission request workflow: submit, review, decide.
//!
//! Deciding is a three-step protocol over two independently atomic records:
//!
//! 1. **claim** the request (conditional on PENDING and no live claim);
//! 2. **merge** the granted cells into the requester's live matrix
//!    (APPROVED only; grant-only, so replays are harmless);
//! 3. **complete** the request (conditional on still holding the claim).
//!
//! The principal is always updated before the request reads as decided. If
//! the merge fails the claim is released and the request stays PENDING. A
//! claim remembers its verdict: an approval abandoned after its merge can only
//! be resumed by another approval, which re-runs the merge and completes.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::instrument;

use terra_auth::{
    PermissionPatch, PermissionRequest, PrincipalSummary, RequestDecision, RequestStatus, WorkflowError, require_admin,
};
use terra_core::PermissionRequestId;

use super::{Actor, ServiceError};
use crate::store::{CredentialStore, PermissionRequestStore, StoreError};

/// How long a decision claim blocks other deciders.
pub const DECISION_CLAIM_LEASE_SECS: i64 = 30;

/// Pending request as shown to administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRequest {
    #[serde(flatten)]
    pub request: PermissionRequest,
    /// `None` if the requester record is gone.
    pub requester: Option<PrincipalSummary>,
}

#[derive(Clone)]
pub struct PermissionRequestService {
    requests: Arc<dyn PermissionRequestStore>,
    credentials: Arc<dyn CredentialStore>,
    claim_lease: Duration,
}

impl PermissionRequestService {
    pub fn new(requests: Arc<dyn PermissionRequestStore>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            requests,
            credentials,
            claim_lease: Duration::seconds(DECISION_CLAIM_LEASE_SECS),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    #[instrument(skip(self, actor, requested, message), fields(principal_id = %actor.id), err)]
    pub async fn submit(
        &self,
        actor: &Actor,
        requested: PermissionPatch,
        message: Option<String>,
    ) -> Result<PermissionRequest, ServiceError> {
        if self.credentials.get(actor.id).await?.is_none() {
            return Err(ServiceError::Unauthenticated);
        }

        let request = PermissionRequest::submit(actor.id, &requested, message, Utc::now())?;
        self.requests.insert(request.clone()).await?;

        tracing::info!(request_id = %request.id, grants = request.requested.grants().len(), "permission request submitted");
        Ok(request)
    }

    pub async fn list_own(&self, actor: &Actor) -> Result<Vec<PermissionRequest>, ServiceError> {
        Ok(self.requests.list_for_principal(actor.id).await?)
    }

    #[instrument(skip(self, actor), fields(principal_id = %actor.id), err)]
    pub async fn list_pending(&self, actor: &Actor) -> Result<Vec<PendingRequest>, ServiceError> {
        require_admin(actor.role)?;

        let pending = self.requests.list_pending().await?;
        let mut out = Vec::with_capacity(pending.len());
        for request in pending {
            let requester = self
                .credentials
                .get(request.principal_id)
                .await?
                .map(|p| p.summary());
            out.push(PendingRequest { request, requester });
        }
        Ok(out)
    }

    #[instrument(skip(self, actor), fields(principal_id = %actor.id, request_id = %id), err)]
    pub async fn mark_read(&self, actor: &Actor, id: PermissionRequestId) -> Result<PermissionRequest, ServiceError> {
        require_admin(actor.role)?;
        Ok(self.requests.mark_read(id, Utc::now()).await?)
    }

    #[instrument(skip(self, actor), fields(principal_id = %actor.id, request_id = %id, decision = ?decision), err)]
    pub async fn decide(
        &self,
        actor: &Actor,
        id: PermissionRequestId,
        decision: RequestDecision,
    ) -> Result<PermissionRequest, ServiceError> {
        require_admin(actor.role)?;

        let now = Utc::now();
        let (request, claim) = self.requests.claim(id, now, self.claim_lease, decision).await?;

        if decision == RequestDecision::Approved {
            let merged = self
                .credentials
                .merge_permissions(request.principal_id, &request.requested, now)
                .await;

            if let Err(err) = merged {
                if let Err(release_err) = self.requests.release(id, claim.token).await {
                    tracing::warn!(error = %release_err, "failed to release decision claim");
                }
                return Err(match err {
                    StoreError::NotFound(_) => ServiceError::NotFound("principal"),
                    other => other.into(),
                });
            }
        }

        let completed = self
            .requests
            .complete(id, claim.token, decision, actor.id, Utc::now())
            .await;

        let decided = match completed {
            Ok(decided) => decided,
            Err(err) if decision == RequestDecision::Approved => {
                // The grant is already live; only an approval may have overtaken us.
                match err {
                    StoreError::Workflow(WorkflowError::AlreadyDecided(RequestStatus::Approved)) => self
                        .requests
                        .get(id)
                        .await?
                        .ok_or(ServiceError::NotFound("permission request"))?,
                    other => {
                        tracing::error!(error = %other, "approval merged but request not completed");
                        return Err(ServiceError::Internal(format!(
                            "approval of request {id} applied but not recorded: {other}"
                        )));
                    }
                }
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(requester_id = %decided.principal_id, status = %decided.status, "permission request decided");
        Ok(decided)
    }
}
