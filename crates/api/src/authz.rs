//! API-side permission guard for resource routers.
//!
//! Attach with [`guard_layer`] to a router that serves one resource. The
//! action comes from the HTTP method unless the state pins one explicitly.

use axum::{
    extract::State,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};

use terra_auth::{Action, Resource};
use terra_infra::{PermissionGuard, ServiceError};

use crate::app::errors::{json_error, service_error_to_response};
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct GuardState {
    pub guard: PermissionGuard,
    pub resource: Resource,
    /// Overrides the method-derived action.
    pub action: Option<Action>,
}

impl GuardState {
    pub fn for_resource(guard: PermissionGuard, resource: Resource) -> Self {
        Self {
            guard,
            resource,
            action: None,
        }
    }

    pub fn for_action(guard: PermissionGuard, resource: Resource, action: Action) -> Self {
        Self {
            guard,
            resource,
            action: Some(action),
        }
    }
}

/// GET/HEAD → read, POST → create, PUT/PATCH → update, DELETE → delete.
pub fn action_for_method(method: &Method) -> Option<Action> {
    match *method {
        Method::GET | Method::HEAD => Some(Action::Read),
        Method::POST => Some(Action::Create),
        Method::PUT | Method::PATCH => Some(Action::Update),
        Method::DELETE => Some(Action::Delete),
        _ => None,
    }
}

/// Runs before the handler; a denial never reaches it.
pub async fn guard_layer(
    State(state): State<GuardState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(principal) = req.extensions().get::<PrincipalContext>().cloned() else {
        return service_error_to_response(ServiceError::Unauthenticated);
    };

    let Some(action) = state.action.or_else(|| action_for_method(req.method())) else {
        return json_error(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "method not allowed");
    };

    match state.guard.check(principal.actor(), state.resource, action).await {
        Ok(_) => next.run(req).await,
        Err(err) => service_error_to_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_mapping() {
        assert_eq!(action_for_method(&Method::GET), Some(Action::Read));
        assert_eq!(action_for_method(&Method::HEAD), Some(Action::Read));
        assert_eq!(action_for_method(&Method::POST), Some(Action::Create));
        assert_eq!(action_for_method(&Method::PUT), Some(Action::Update));
        assert_eq!(action_for_method(&Method::PATCH), Some(Action::Update));
        assert_eq!(action_for_method(&Method::DELETE), Some(Action::Delete));
        assert_eq!(action_for_method(&Method::OPTIONS), None);
    }
}
