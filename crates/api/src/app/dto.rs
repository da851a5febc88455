use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use terra_auth::{PermissionPatch, RequestDecision};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitPermissionRequest {
    #[serde(default)]
    pub requested: PermissionPatch,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub decision: RequestDecision,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_id(raw: &str) -> Result<Uuid, axum::response::Response> {
    Uuid::parse_str(raw)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "invalid identifier"))
}
