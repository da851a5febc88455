use core::str::FromStr;

use serde::{Deserialize, Serialize};

use terra_core::DomainError;

/// Role tag carried by every principal.
///
/// Roles are a flat tag, not a permission hierarchy: `Admin` is checked first by
/// the guard and bypasses the permission matrix entirely. It never implies any
/// matrix contents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Role {
    #[default]
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "ADMIN")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(DomainError::validation(
                "role",
                format!("unknown role '{other}' (expected USER or ADMIN)"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_match_storage_names() {
        for role in [Role::User, Role::Admin] {
            let json = serde_json::to_value(role).unwrap();
            assert_eq!(json, role.as_str());
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn only_admin_is_privileged() {
        assert!(Role::Admin.is_privileged());
        assert!(!Role::User.is_privileged());
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn unknown_role_is_a_validation_error() {
        let err = "root".parse::<Role>().unwrap_err();
        assert_eq!(err.field(), Some("role"));
    }
}
