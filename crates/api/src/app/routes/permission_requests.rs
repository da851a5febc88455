use std::sync::Arc;

use axum::{
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};

use terra_core::PermissionRequestId;

use crate::app::dto::{DecideRequest, SubmitPermissionRequest, parse_id};
use crate::app::errors::{json_rejection_to_response, service_error_to_response};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", post(submit))
        .route("/me", get(list_own))
        .route("/admin/pending", get(list_pending))
        .route("/admin/:id/read", patch(mark_read))
        .route("/admin/:id/decide", patch(decide))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /permission-requests
pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    payload: Result<Json<SubmitPermissionRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services
        .requests
        .submit(principal.actor(), body.requested, body.message)
        .await
    {
        Ok(request) => (StatusCode::CREATED, Json(request)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// GET /permission-requests/me
pub async fn list_own(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.requests.list_own(principal.actor()).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// GET /permission-requests/admin/pending
pub async fn list_pending(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.requests.list_pending(principal.actor()).await {
        Ok(items) => (StatusCode::OK, Json(items)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// PATCH /permission-requests/admin/:id/read
pub async fn mark_read(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => PermissionRequestId::from_uuid(id),
        Err(resp) => return resp,
    };

    match services.requests.mark_read(principal.actor(), id).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// PATCH /permission-requests/admin/:id/decide
pub async fn decide(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<DecideRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_id(&id) {
        Ok(id) => PermissionRequestId::from_uuid(id),
        Err(resp) => return resp,
    };
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services.requests.decide(principal.actor(), id, body.decision).await {
        Ok(request) => (StatusCode::OK, Json(request)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
