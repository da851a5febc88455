//! HTTP API application wiring (Axum router + service wiring).
//!
//! Layout:
//! - `services.rs`: store selection, token codec, mailer, bootstrap seeding
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::post, Extension, Router};
use tower::ServiceBuilder;

use terra_auth::{Action, Resource};

use crate::authz::{GuardState, guard_layer};
use crate::{middleware, throttle};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError, build_services};

/// A router serving one protected resource.
///
/// Every route in `router` is checked against `resource`. The action comes
/// from the HTTP method unless one is pinned.
pub struct ResourceRoutes {
    resource: Resource,
    action: Option<Action>,
    router: Router,
}

impl ResourceRoutes {
    pub fn new(resource: Resource, router: Router) -> Self {
        Self {
            resource,
            action: None,
            router,
        }
    }

    /// Check `action` for every route, whatever the method.
    pub fn pinned(resource: Resource, action: Action, router: Router) -> Self {
        Self {
            resource,
            action: Some(action),
            router,
        }
    }
}

/// Build the full HTTP router.
///
/// `resources` are mounted at `/{resource}` behind authentication and the
/// permission guard. Several entries may share a resource; their routes must
/// not overlap.
pub fn build_app(services: AppServices, resources: Vec<ResourceRoutes>) -> Router {
    let auth_state = middleware::AuthState {
        tokens: services.tokens.clone(),
    };

    let mut mounted: Vec<(Resource, Router)> = Vec::new();
    for entry in resources {
        let state = match entry.action {
            Some(action) => GuardState::for_action(services.guard.clone(), entry.resource, action),
            None => GuardState::for_resource(services.guard.clone(), entry.resource),
        };
        let guarded = entry
            .router
            .layer(axum::middleware::from_fn_with_state(state, guard_layer));

        match mounted.iter_mut().find(|(r, _)| *r == entry.resource) {
            Some((_, router)) => *router = std::mem::take(router).merge(guarded),
            None => mounted.push((entry.resource, guarded)),
        }
    }

    let mut protected = routes::protected_router();
    for (resource, router) in mounted {
        protected = protected.nest(&format!("/{}", resource.as_str()), router);
    }
    let protected = protected.layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    // Login alone is rate limited per client address.
    let login = Router::new().route(
        "/auth/login",
        post(routes::auth::login).layer(axum::middleware::from_fn_with_state(
            services.login_throttle.clone(),
            throttle::login_throttle,
        )),
    );

    Router::new()
        .merge(routes::public_router())
        .merge(login)
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(Arc::new(services))))
}
