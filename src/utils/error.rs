use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.as_str() {
            "ValidationError" => StatusCode::BAD_REQUEST,
            "AuthenticationError" => StatusCode::UNAUTHORIZED,
            "AuthorizationError" => StatusCode::FORBIDDEN,
            "NotFoundError" => StatusCode::NOT_FOUND,
            "PayloadTooLarge" => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("ValidationError", message)
    }

    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self::new("AuthenticationError", message)
    }

    pub fn not_found_error(message: impl Into<String>) -> Self {
        Self::new("NotFoundError", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("InternalError", message)
    }

    pub fn payload_too_large() -> Self {
        Self::new("PayloadTooLarge", "Request payload too large")
    }
}

/// Failures talking to the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport failure before any response arrived
    #[error("store unreachable: {0}")]
    Unreachable(String),
    #[error("store returned unexpected status {status} for {resource}")]
    UnexpectedStatus { resource: &'static str, status: u16 },
    #[error("store returned no {resource} record")]
    EmptyResult { resource: &'static str },
    #[error("store returned malformed {resource} record: {source}")]
    Malformed {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Infrastructure faults raised while resolving credentials.
///
/// Token and identity problems are never faults; they resolve to an
/// unauthenticated request.
#[derive(Debug, thiserror::Error)]
pub enum AuthFault {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("provider key set unavailable: {0}")]
    KeySet(String),
}

/// Failures raised by the photo lifecycle when it is configured not to swallow them.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("failed to load photo {id} before update: {source}")]
    FetchBeforeWrite {
        id: i64,
        #[source]
        source: StoreError,
    },
}

// From implementations for common error types
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {}", err);
        Self::internal_error("Internal server error")
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Database error: {}", err);
        Self::internal_error("Database operation failed")
    }
}

impl From<AuthFault> for ApiError {
    fn from(err: AuthFault) -> Self {
        tracing::error!("Authentication infrastructure fault: {}", err);
        Self::internal_error("Authentication service unavailable")
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        tracing::error!("Photo lifecycle error: {}", err);
        Self::internal_error("Photo lifecycle failed")
    }
}
