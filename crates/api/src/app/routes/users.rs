use std::sync::Arc;

use axum::{
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use terra_auth::{AdminUpdate, ProfileUpdate};
use terra_core::PrincipalId;

use crate::app::dto::parse_id;
use crate::app::errors::{json_rejection_to_response, service_error_to_response};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list))
        .route("/me", get(own_profile).put(update_own_profile))
        .route("/:id", put(update))
}

/// GET /users/me
pub async fn own_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.users.own_profile(principal.actor()).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// PUT /users/me
pub async fn update_own_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services.users.update_own_profile(principal.actor(), body).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// GET /users (admin)
pub async fn list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.users.list(principal.actor()).await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// PUT /users/:id (admin)
pub async fn update(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<AdminUpdate>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => PrincipalId::from_uuid(id),
        Err(resp) => return resp,
    };
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services.users.update(principal.actor(), id, body).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
