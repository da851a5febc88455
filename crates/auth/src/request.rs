//! Permission elevation requests and their decision state machine.
//!
//! ```text
//! PENDING ──claim──▶ PENDING(claimed) ──complete──▶ APPROVED | REJECTED
//!    ▲                     │
//!    └──────release────────┘
//! ```
//!
//! A claim is the single-winner step: only one decider can hold it, and only a
//! PENDING request can be claimed. Terminal states accept no further mutation
//! apart from the admin-read flag.
//!
//! A claim records the verdict it was taken for. An expired APPROVED claim may
//! already have granted its cells, so it can only be taken over by another
//! approval.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use terra_core::{PermissionRequestId, PrincipalId};

use crate::PermissionPatch;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "PENDING",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(RequestStatus::Pending),
            "APPROVED" => Some(RequestStatus::Approved),
            "REJECTED" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrator verdict.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequestDecision {
    Approved,
    Rejected,
}

impl RequestDecision {
    pub fn status(self) -> RequestStatus {
        match self {
            RequestDecision::Approved => RequestStatus::Approved,
            RequestDecision::Rejected => RequestStatus::Rejected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.status().as_str()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APPROVED" => Some(RequestDecision::Approved),
            "REJECTED" => Some(RequestDecision::Rejected),
            _ => None,
        }
    }
}

/// Exclusive right to decide a request, held for at most one lease.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DecisionClaim {
    pub token: Uuid,
    pub claimed_at: DateTime<Utc>,
    pub decision: RequestDecision,
}

impl DecisionClaim {
    fn is_live(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        now < self.claimed_at + lease
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("requested permissions must enable at least one action")]
    EmptyPatch,

    #[error("request already decided ({0})")]
    AlreadyDecided(RequestStatus),

    #[error("request is already being decided")]
    DecisionInProgress,

    #[error("decision claim was lost")]
    ClaimLost,

    #[error("an interrupted approval can only be finished as APPROVED")]
    InterruptedApproval,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: PermissionRequestId,
    #[serde(rename = "userId")]
    pub principal_id: PrincipalId,
    /// Only `true` cells are kept.
    pub requested: PermissionPatch,
    pub message: String,
    pub status: RequestStatus,
    pub decided_by: Option<PrincipalId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub is_read_by_admin: bool,
    #[serde(skip)]
    pub claim: Option<DecisionClaim>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PermissionRequest {
    /// Open a new PENDING request. Rejects patches that grant nothing.
    pub fn submit(
        principal_id: PrincipalId,
        requested: &PermissionPatch,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, WorkflowError> {
        if !requested.has_grants() {
            return Err(WorkflowError::EmptyPatch);
        }

        Ok(Self {
            id: PermissionRequestId::new(),
            principal_id,
            requested: requested.only_grants(),
            message: message.map(|m| m.trim().to_string()).unwrap_or_default(),
            status: RequestStatus::Pending,
            decided_by: None,
            decided_at: None,
            is_read_by_admin: false,
            claim: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Take the exclusive decision claim for `decision`.
    ///
    /// A claim older than `lease` is considered abandoned and can be taken over,
    /// except that an abandoned approval may only be resumed as an approval.
    pub fn claim(
        &mut self,
        now: DateTime<Utc>,
        lease: Duration,
        decision: RequestDecision,
    ) -> Result<DecisionClaim, WorkflowError> {
        if !self.is_pending() {
            return Err(WorkflowError::AlreadyDecided(self.status));
        }
        if let Some(held) = self.claim {
            if held.is_live(now, lease) {
                return Err(WorkflowError::DecisionInProgress);
            }
            if held.decision == RequestDecision::Approved && decision != RequestDecision::Approved {
                return Err(WorkflowError::InterruptedApproval);
            }
        }

        let claim = DecisionClaim {
            token: Uuid::new_v4(),
            claimed_at: now,
            decision,
        };
        self.claim = Some(claim);
        Ok(claim)
    }

    /// Record the verdict. Requires the caller to still hold `token`, taken
    /// for the same `decision`.
    pub fn complete(
        &mut self,
        token: Uuid,
        decision: RequestDecision,
        decided_by: PrincipalId,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        if !self.is_pending() {
            return Err(WorkflowError::AlreadyDecided(self.status));
        }
        match self.claim {
            Some(held) if held.token == token && held.decision == decision => {}
            _ => return Err(WorkflowError::ClaimLost),
        }

        self.status = decision.status();
        self.decided_by = Some(decided_by);
        self.decided_at = Some(now);
        self.is_read_by_admin = true;
        self.claim = None;
        self.updated_at = now;
        Ok(())
    }

    /// Give up a claim without deciding. No-op if `token` no longer holds it.
    pub fn release(&mut self, token: Uuid) -> bool {
        if self.claim.map(|c| c.token) == Some(token) {
            self.claim = None;
            true
        } else {
            false
        }
    }

    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        self.is_read_by_admin = true;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, Resource};

    fn lease() -> Duration {
        Duration::seconds(30)
    }

    fn pending() -> PermissionRequest {
        let patch = PermissionPatch::from_grants([(Resource::Countries, Action::Create)]);
        PermissionRequest::submit(PrincipalId::new(), &patch, Some("  please ".into()), Utc::now()).unwrap()
    }

    #[test]
    fn submit_starts_pending_and_unread() {
        let r = pending();
        assert_eq!(r.status, RequestStatus::Pending);
        assert!(!r.is_read_by_admin);
        assert_eq!(r.message, "please");
        assert!(r.decided_by.is_none() && r.decided_at.is_none());
    }

    #[test]
    fn submit_rejects_patch_without_grants() {
        let all_false: PermissionPatch =
            serde_json::from_value(serde_json::json!({ "cities": { "create": false } })).unwrap();
        assert_eq!(
            PermissionRequest::submit(PrincipalId::new(), &all_false, None, Utc::now()),
            Err(WorkflowError::EmptyPatch)
        );
        assert_eq!(
            PermissionRequest::submit(PrincipalId::new(), &PermissionPatch::default(), None, Utc::now()),
            Err(WorkflowError::EmptyPatch)
        );
    }

    #[test]
    fn claim_then_complete_is_terminal() {
        let mut r = pending();
        let now = Utc::now();
        let admin = PrincipalId::new();

        let claim = r.claim(now, lease(), RequestDecision::Approved).unwrap();
        r.complete(claim.token, RequestDecision::Approved, admin, now).unwrap();

        assert_eq!(r.status, RequestStatus::Approved);
        assert_eq!(r.decided_by, Some(admin));
        assert!(r.is_read_by_admin);
        assert!(r.claim.is_none());

        assert_eq!(
            r.claim(now, lease(), RequestDecision::Approved),
            Err(WorkflowError::AlreadyDecided(RequestStatus::Approved))
        );
    }

    #[test]
    fn second_claim_loses_while_first_is_live() {
        let mut r = pending();
        let now = Utc::now();
        r.claim(now, lease(), RequestDecision::Approved).unwrap();
        assert_eq!(r.claim(now, lease(), RequestDecision::Approved), Err(WorkflowError::DecisionInProgress));
    }

    #[test]
    fn abandoned_claim_can_be_taken_over() {
        let mut r = pending();
        let now = Utc::now();
        let stale = r.claim(now, lease(), RequestDecision::Rejected).unwrap();
        let later = now + lease() + Duration::seconds(1);
        let fresh = r.claim(later, lease(), RequestDecision::Approved).unwrap();

        assert_eq!(
            r.complete(stale.token, RequestDecision::Rejected, PrincipalId::new(), later),
            Err(WorkflowError::ClaimLost)
        );
        assert!(r.complete(fresh.token, RequestDecision::Approved, PrincipalId::new(), later).is_ok());
        assert_eq!(r.status, RequestStatus::Approved);
    }

    #[test]
    fn abandoned_approval_is_only_resumed_as_approval() {
        let mut r = pending();
        let now = Utc::now();
        let stale = r.claim(now, lease(), RequestDecision::Approved).unwrap();
        let later = now + lease() + Duration::seconds(1);

        assert_eq!(
            r.claim(later, lease(), RequestDecision::Rejected),
            Err(WorkflowError::InterruptedApproval)
        );
        assert_eq!(r.claim.map(|c| c.token), Some(stale.token));

        let resumed = r.claim(later, lease(), RequestDecision::Approved).unwrap();
        assert_eq!(resumed.decision, RequestDecision::Approved);
        r.complete(resumed.token, RequestDecision::Approved, PrincipalId::new(), later)
            .unwrap();
        assert_eq!(r.status, RequestStatus::Approved);
    }

    #[test]
    fn complete_must_match_the_claimed_decision() {
        let mut r = pending();
        let now = Utc::now();
        let claim = r.claim(now, lease(), RequestDecision::Rejected).unwrap();
        assert_eq!(
            r.complete(claim.token, RequestDecision::Approved, PrincipalId::new(), now),
            Err(WorkflowError::ClaimLost)
        );
        assert!(r.is_pending());
    }

    #[test]
    fn release_reopens_the_request() {
        let mut r = pending();
        let now = Utc::now();
        let claim = r.claim(now, lease(), RequestDecision::Approved).unwrap();
        assert!(r.release(claim.token));
        assert!(r.claim(now, lease(), RequestDecision::Approved).is_ok());
    }

    #[test]
    fn serialized_shape_hides_claim() {
        let mut r = pending();
        r.claim(Utc::now(), lease(), RequestDecision::Approved).unwrap();
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["isReadByAdmin"], false);
        assert!(json.get("userId").is_some());
        assert!(json.get("claim").is_none());
    }
}
