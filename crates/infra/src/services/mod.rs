//! Application services: the authorization core's use cases over the stores.

pub mod credentials;
pub mod error;
pub mod guard;
pub mod seed;
pub mod users;
pub mod workflow;

pub use credentials::{AuthSession, CredentialService, FORGOT_PASSWORD_ACK};
pub use error::ServiceError;
pub use guard::PermissionGuard;
pub use seed::seed_admin;
pub use users::UserAdminService;
pub use workflow::{DECISION_CLAIM_LEASE_SECS, PendingRequest, PermissionRequestService};

use terra_auth::{Role, SessionClaims};
use terra_core::PrincipalId;

/// Verified caller identity, as carried by the session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: PrincipalId,
    pub username: String,
    pub role: Role,
}

impl From<SessionClaims> for Actor {
    fn from(claims: SessionClaims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::Utc;
    use terra_auth::{Principal, Signup};

    use super::Actor;
    use crate::store::{CredentialStore, InMemoryCredentialStore};

    pub fn signup(username: &str) -> Signup {
        Signup {
            first_name: "Avi".into(),
            last_name: "Peretz".into(),
            username: username.into(),
            email: format!("{username}@example.com"),
            phone: "050-7654321".into(),
            password: "password-123".into(),
            profile_image_path: None,
        }
    }

    /// Insert a principal with a placeholder hash; returns its token identity.
    pub async fn seeded(store: &Arc<InMemoryCredentialStore>, username: &str, role: terra_auth::Role) -> Actor {
        let mut principal = Principal::register(&signup(username).validated().unwrap(), "hash".into(), Utc::now());
        principal.role = role;
        let actor = Actor {
            id: principal.id,
            username: principal.username.clone(),
            role,
        };
        store.insert(principal).await.unwrap();
        actor
    }
}
