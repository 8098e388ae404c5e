use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::engine::eligibility::EligibilityReason;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("stale request: {0}")]
    StaleRequest(String),

    #[error("ineligible: {}", .0.describe())]
    Ineligible(EligibilityReason),

    #[error("no eligible driver available")]
    NoCandidate,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::NotAuthorized(_) => "not_authorized",
            AppError::StaleRequest(_) => "stale_request",
            AppError::Ineligible(_) => "ineligible",
            AppError::NoCandidate => "no_candidate",
            AppError::BadRequest(_) => "bad_request",
            AppError::Conflict(_) => "conflict",
            AppError::Persistence(_) => "persistence",
            AppError::Delivery(_) => "delivery",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::NotAuthorized(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::StaleRequest(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Ineligible(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                reason.describe().to_string(),
            ),
            AppError::NoCandidate => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no eligible driver available".to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Persistence(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Delivery(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
