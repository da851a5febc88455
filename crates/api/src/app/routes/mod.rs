use axum::{routing::get, Router};

pub mod auth;
pub mod permission_requests;
pub mod system;
pub mod users;

/// Endpoints reachable without a token (login excluded; see `build_app`).
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/auth", auth::public_router())
}

/// Router for all authenticated endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .nest("/auth", auth::protected_router())
        .nest("/permission-requests", permission_requests::router())
        .nest("/users", users::router())
}
