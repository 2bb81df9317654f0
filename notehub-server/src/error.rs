//! Error types for notehub-server
//!
//! `ApiError` answers JSON routes, `PageError` answers HTML routes. Both log
//! internal failures and never leak their detail to the client.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::render;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Not signed in or not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Business-rule rejection reported in-band (200, `status: failed`)
    #[error("Failed: {0}")]
    Failed(String),

    /// A live collaborative session holds the note (403)
    #[error("Busy: {0}")]
    Busy(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Common error: {0}")]
    Common(#[from] notehub_common::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    pub fn forbidden() -> Self {
        ApiError::Forbidden("forbidden".to_string())
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Forbidden(msg) => (
                StatusCode::FORBIDDEN,
                json!({ "status": "forbidden", "msg": msg }),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "status": "not found", "msg": msg }),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "error", "msg": msg }),
            ),
            ApiError::Failed(msg) => (StatusCode::OK, json!({ "status": "failed", "msg": msg })),
            ApiError::Busy(message) => (
                StatusCode::FORBIDDEN,
                json!({ "status": "error", "message": message }),
            ),
            ApiError::Common(notehub_common::Error::NotFound(msg)) => (
                StatusCode::NOT_FOUND,
                json!({ "status": "not found", "msg": msg }),
            ),
            ApiError::Common(notehub_common::Error::InvalidInput(msg)) => (
                StatusCode::BAD_REQUEST,
                json!({ "status": "error", "msg": msg }),
            ),
            internal => {
                error!("Request failed: {}", internal);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "status": "error", "msg": "Internal Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Error pages for browser-facing routes
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for PageError {
    fn from(e: sqlx::Error) -> Self {
        PageError::Internal(e.to_string())
    }
}

impl From<notehub_common::Error> for PageError {
    fn from(e: notehub_common::Error) -> Self {
        match e {
            notehub_common::Error::NotFound(_) => PageError::NotFound,
            notehub_common::Error::InvalidInput(msg) => PageError::BadRequest(msg),
            other => PageError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            PageError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            PageError::NotFound => (StatusCode::NOT_FOUND, "Not Found".to_string()),
            PageError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PageError::Internal(detail) => {
                error!("Page failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error".to_string())
            }
        };

        (status, Html(render::error_page(status.as_u16(), &message))).into_response()
    }
}

pub type PageResult<T> = Result<T, PageError>;
