//! Sync error types with HTTP status code mapping.
//!
//! [`SyncError`] is the central error type of the crate. The reconciler
//! absorbs most of these internally (a failed snapshot fetch degrades to an
//! empty dashboard); they only reach a caller through configuration,
//! construction, or the local HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "no active dashboard session",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Crate-wide error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status               |
/// |-----------|-------------------|---------------------------|
/// | 1000–1999 | Validation/config | 400 Bad Request           |
/// | 2000–2999 | Session state     | 409 Conflict              |
/// | 3000–3999 | Internal          | 500 Internal Server Error |
/// | 4000–4999 | Upstream          | 502 Bad Gateway           |
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Subject kind or id could not be parsed.
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    /// Configuration value could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No dashboard session is active.
    #[error("no active dashboard session")]
    NotInitialized,

    /// The REST snapshot request failed (network, status, or decode).
    #[error("snapshot fetch failed: {0}")]
    SnapshotFetch(String),

    /// The backend answered with `success: false` or without data.
    #[error("snapshot rejected by backend: {0}")]
    SnapshotRejected(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidSubject(_) => 1001,
            Self::Config(_) => 1002,
            Self::NotInitialized => 2001,
            Self::Internal(_) => 3000,
            Self::SnapshotFetch(_) => 4001,
            Self::SnapshotRejected(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSubject(_) | Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::NotInitialized => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::SnapshotFetch(_) | Self::SnapshotRejected(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::SnapshotFetch(err.to_string())
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
