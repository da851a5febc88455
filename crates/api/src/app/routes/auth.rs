use std::sync::Arc;

use axum::{
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use terra_auth::Signup;
use terra_infra::services::FORGOT_PASSWORD_ACK;

use crate::app::dto::{ForgotPasswordRequest, LoginRequest, MessageResponse, ResetPasswordRequest};
use crate::app::errors::{json_rejection_to_response, service_error_to_response};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Public credential endpoints. Login is mounted separately behind the throttle.
pub fn public_router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

pub fn protected_router() -> Router {
    Router::new().route("/me", get(me))
}

/// POST /auth/signup
pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<Signup>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services.credentials.signup(body).await {
        Ok(session) => (StatusCode::CREATED, Json(session)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services.credentials.login(&body.username, &body.password).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// GET /auth/me
pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.credentials.me(principal.actor()).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// POST /auth/forgot-password
pub async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services.credentials.forgot_password(&body.email).await {
        Ok(()) => (StatusCode::OK, Json(MessageResponse::new(FORGOT_PASSWORD_ACK))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}

/// POST /auth/reset-password
pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(rejection) => return json_rejection_to_response(rejection),
    };

    match services
        .credentials
        .reset_password(&body.token, &body.new_password)
        .await
    {
        Ok(()) => (StatusCode::OK, Json(MessageResponse::new("Password updated successfully"))).into_response(),
        Err(e) => service_error_to_response(e),
    }
}
