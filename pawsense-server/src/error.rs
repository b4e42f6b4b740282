// Errors surfaced by the relay layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pawsense_core::Error as CoreError;
use pawsense_eye::VisionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delivery failures of the chat notification sink
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notifications are disabled: {0}")]
    Disabled(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bot API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures starting real-time monitoring
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Real-time monitoring is already running")]
    AlreadyRunning,

    #[error("{0}")]
    Unavailable(String),

    #[error("Could not open the capture source: {0}")]
    Source(#[from] VisionError),
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Free analysis limit of {limit} reached")]
    LimitReached { limit: u32 },

    #[error("No dog detected in the upload")]
    NoDogDetected,

    #[error("{0}")]
    Unavailable(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Delivery failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NoDogDetected => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Notify(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::LimitReached { .. } => "LIMIT_REACHED",
            ApiError::NoDogDetected => "NO_DOG_DETECTED",
            ApiError::Unavailable(_) => "UNAVAILABLE",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Notify(_) => "DELIVERY_FAILED",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::NoDogDetected => ApiError::NoDogDetected,
            VisionError::Decode(msg) => ApiError::BadRequest(format!("Could not decode upload: {}", msg)),
            VisionError::Unavailable(msg) => ApiError::Unavailable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::AlreadyRunning => ApiError::Conflict(err.to_string()),
            MonitorError::Unavailable(msg) => ApiError::Unavailable(msg),
            MonitorError::Source(e) => ApiError::Unavailable(format!("Could not open the capture source: {}", e)),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::QuotaExceeded { limit, .. } => ApiError::LimitReached { limit },
            CoreError::Authorization(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_maps_to_too_many_requests() {
        let err = ApiError::from(CoreError::QuotaExceeded {
            client: "10.0.0.1".to_string(),
            limit: 5,
        });
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.code(), "LIMIT_REACHED");
    }

    #[test]
    fn test_no_dog_is_unprocessable() {
        let err = ApiError::from(VisionError::NoDogDetected);
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
