//! `terra-auth`: pure authentication/authorization model.
//!
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod request;
pub mod reset;
pub mod roles;
pub mod token;

pub use authorize::{AuthzError, Decision, authorize, require_admin};
pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use password::{MIN_PASSWORD_LEN, PasswordError, hash_password, verify_against_dummy, verify_password};
pub use permissions::{Action, CrudPatch, CrudPermissions, PermissionMatrix, PermissionPatch, Resource};
pub use principal::{
    AdminUpdate, Principal, PrincipalProfile, PrincipalSummary, ProfileUpdate, ResetState, Signup, check_password,
};
pub use request::{DecisionClaim, PermissionRequest, RequestDecision, RequestStatus, WorkflowError};
pub use reset::{ResetToken, hash_reset_token, reset_token_ttl};
pub use roles::Role;
pub use token::{Hs256TokenCodec, TokenCodec, TokenError};
