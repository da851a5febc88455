use serde::Serialize;
use thiserror::Error;

use crate::{Action, PermissionMatrix, Resource, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{resource}.{action}'")]
    Forbidden { resource: Resource, action: Action },

    #[error("forbidden: administrator role required")]
    AdminRequired,
}

/// Why a check was allowed. Denials are [`AuthzError`]s.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Privileged role; the matrix was not consulted.
    Bypass,
    /// The matrix cell for the requested pair is `true`.
    Granted,
}

/// Decide a `(resource, action)` check for a principal.
///
/// - No IO
/// - No panics
/// - Role is checked first; `Admin` never looks at the matrix.
///
/// Callers must pass the *persisted* matrix, never one reconstructed from a
/// session token.
pub fn authorize(
    role: Role,
    matrix: &PermissionMatrix,
    resource: Resource,
    action: Action,
) -> Result<Decision, AuthzError> {
    if role.is_privileged() {
        return Ok(Decision::Bypass);
    }

    if matrix.allows(resource, action) {
        Ok(Decision::Granted)
    } else {
        Err(AuthzError::Forbidden { resource, action })
    }
}

/// Gate for administrator-only operations.
pub fn require_admin(role: Role) -> Result<(), AuthzError> {
    if role.is_privileged() {
        Ok(())
    } else {
        Err(AuthzError::AdminRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_resource() -> impl Strategy<Value = Resource> {
        prop_oneof![Just(Resource::Countries), Just(Resource::Cities)]
    }

    fn arb_action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Read),
            Just(Action::Create),
            Just(Action::Update),
            Just(Action::Delete),
        ]
    }

    fn arb_matrix() -> impl Strategy<Value = PermissionMatrix> {
        proptest::collection::vec(any::<bool>(), 8).prop_map(|bits| {
            let mut m = PermissionMatrix::default();
            let mut bits = bits.into_iter();
            for resource in Resource::ALL {
                for action in Action::ALL {
                    m.set(resource, action, bits.next().unwrap_or(false));
                }
            }
            m
        })
    }

    proptest! {
        #[test]
        fn standard_role_follows_matrix_cell(
            matrix in arb_matrix(),
            resource in arb_resource(),
            action in arb_action(),
        ) {
            let outcome = authorize(Role::User, &matrix, resource, action);
            prop_assert_eq!(outcome.is_ok(), matrix.allows(resource, action));
        }

        #[test]
        fn admin_always_bypasses(
            matrix in arb_matrix(),
            resource in arb_resource(),
            action in arb_action(),
        ) {
            prop_assert_eq!(authorize(Role::Admin, &matrix, resource, action), Ok(Decision::Bypass));
        }
    }

    #[test]
    fn denial_names_the_missing_cell() {
        let err = authorize(
            Role::User,
            &PermissionMatrix::default(),
            Resource::Cities,
            Action::Delete,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "forbidden: missing permission 'cities.delete'");
    }

    #[test]
    fn admin_gate() {
        assert!(require_admin(Role::Admin).is_ok());
        assert_eq!(require_admin(Role::User), Err(AuthzError::AdminRequired));
    }
}
