// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert conclave_core errors to HTTP errors
impl From<conclave_core::Error> for AppError {
    fn from(err: conclave_core::Error) -> Self {
        use conclave_core::Error;

        match err {
            Error::NotFound(msg) => AppError::not_found(msg),
            Error::AlreadyJoined(room) => {
                AppError::conflict(format!("already joined room {room}"))
            }
            Error::RoomBusy(room) => AppError::conflict(format!("room {room} is being deleted")),
            Error::Capacity(msg) => AppError::new(StatusCode::SERVICE_UNAVAILABLE, msg),
            Error::InvalidInput(msg) => AppError::bad_request(msg),
            Error::Sfu(e) => {
                tracing::error!("SFU error: {}", e);
                AppError::new(StatusCode::BAD_GATEWAY, "SFU unavailable")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                AppError::internal_server_error("Data processing error")
            }
            Error::ResourceLeak { room_id, .. } => {
                tracing::error!("Resource leak for room {}", room_id);
                AppError::internal_server_error("SFU cleanup failed")
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                AppError::internal_server_error("Internal server error")
            }
        }
    }
}
