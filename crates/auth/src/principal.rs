//! Principal record and its outward projections.
//!
//! # Invariants
//! - `password_hash` and `reset` never leave this crate through serialization:
//!   [`Principal`] does not implement `Serialize`; use [`PrincipalProfile`].
//! - A new principal starts as [`Role::User`] with the default matrix.
//! - Self-service edits cannot touch role or permissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terra_core::{DomainError, DomainResult, PrincipalId};

use crate::password::MIN_PASSWORD_LEN;
use crate::{PermissionMatrix, Role};

const MIN_NAME_LEN: usize = 2;

/// Outstanding password reset: digest of the mailed token and its deadline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetState {
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetState {
    /// Valid only while `now < expires_at` and the digest matches.
    pub fn accepts(&self, token_hash: &str, now: DateTime<Utc>) -> bool {
        now < self.expires_at && self.token_hash == token_hash
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    /// Trimmed and lowercased.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub profile_image_path: Option<String>,
    pub role: Role,
    pub permissions: PermissionMatrix,
    pub password_hash: String,
    pub reset: Option<ResetState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl core::fmt::Debug for Principal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

impl Principal {
    /// Build a fresh principal from validated signup data.
    pub fn register(signup: &Signup, password_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: PrincipalId::new(),
            username: signup.username.clone(),
            email: signup.email.clone(),
            first_name: signup.first_name.clone(),
            last_name: signup.last_name.clone(),
            phone: signup.phone.clone(),
            profile_image_path: signup.profile_image_path.clone(),
            role: Role::User,
            permissions: PermissionMatrix::default(),
            password_hash,
            reset: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn profile(&self) -> PrincipalProfile {
        PrincipalProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            profile_image_path: self.profile_image_path.clone(),
            permissions: self.permissions,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn summary(&self) -> PrincipalSummary {
        PrincipalSummary {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
        }
    }

    pub fn apply_profile_update(&mut self, update: ProfileUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let ProfileUpdate {
            first_name,
            last_name,
            phone,
            profile_image_path,
        } = update.validated()?;

        if let Some(v) = first_name {
            self.first_name = v;
        }
        if let Some(v) = last_name {
            self.last_name = v;
        }
        if let Some(v) = phone {
            self.phone = v;
        }
        if let Some(v) = profile_image_path {
            self.profile_image_path = Some(v);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Administrator edit: profile fields plus role and a full matrix overwrite.
    pub fn apply_admin_update(&mut self, update: AdminUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        let AdminUpdate {
            profile,
            role,
            permissions,
        } = update;

        self.apply_profile_update(profile, now)?;
        if let Some(role) = role {
            self.role = role;
        }
        if let Some(matrix) = permissions {
            self.permissions = matrix;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inputs
// ─────────────────────────────────────────────────────────────────────────────

/// Signup form. Call [`Signup::validated`] before use.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signup {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub profile_image_path: Option<String>,
}

impl core::fmt::Debug for Signup {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Signup")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Signup {
    /// Trim fields, normalize the email, and enforce required/min-length rules.
    pub fn validated(self) -> DomainResult<Self> {
        let first_name = name("firstName", &self.first_name)?;
        let last_name = name("lastName", &self.last_name)?;
        let username = required("username", &self.username)?;
        let email = required("email", &self.email)?.to_lowercase();
        if !email.contains('@') {
            return Err(DomainError::validation("email", "invalid email format"));
        }
        let phone = required("phone", &self.phone)?;
        check_password(&self.password)?;

        Ok(Self {
            first_name,
            last_name,
            username,
            email,
            phone,
            password: self.password,
            profile_image_path: optional(self.profile_image_path),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub profile_image_path: Option<String>,
}

impl ProfileUpdate {
    fn validated(self) -> DomainResult<Self> {
        Ok(Self {
            first_name: self.first_name.map(|v| name("firstName", &v)).transpose()?,
            last_name: self.last_name.map(|v| name("lastName", &v)).transpose()?,
            phone: self.phone.map(|v| required("phone", &v)).transpose()?,
            profile_image_path: optional(self.profile_image_path),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUpdate {
    #[serde(flatten)]
    pub profile: ProfileUpdate,
    pub role: Option<Role>,
    pub permissions: Option<PermissionMatrix>,
}

/// Shared password policy for signup and reset.
pub fn check_password(password: &str) -> DomainResult<()> {
    if password.is_empty() {
        return Err(DomainError::validation("password", "is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(DomainError::validation(
            "password",
            format!("must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

fn required(field: &'static str, value: &str) -> DomainResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(DomainError::validation(field, "is required"));
    }
    Ok(v.to_string())
}

fn name(field: &'static str, value: &str) -> DomainResult<String> {
    let v = required(field, value)?;
    if v.chars().count() < MIN_NAME_LEN {
        return Err(DomainError::validation(
            field,
            format!("must be at least {MIN_NAME_LEN} characters"),
        ));
    }
    Ok(v)
}

fn optional(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// ─────────────────────────────────────────────────────────────────────────────
// Projections
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a client may see about a principal. No secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalProfile {
    pub id: PrincipalId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub profile_image_path: Option<String>,
    pub permissions: PermissionMatrix,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Requester identity shown in the administrator's pending queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrincipalSummary {
    pub id: PrincipalId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}
