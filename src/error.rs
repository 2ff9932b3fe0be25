use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{dao::storage::StorageError, state::room::RoomError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// A storage call exceeded its timeout.
    #[error("storage operation timed out")]
    Timeout,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested room was not found.
    #[error("room `{0}` not found")]
    NotFound(String),
    /// A room with this code already exists.
    #[error("room `{0}` already exists")]
    AlreadyExists(String),
    /// The request broke a room rule.
    #[error(transparent)]
    Room(RoomError),
    /// Concurrent writers kept winning the race for this room.
    #[error("room `{code}` was modified concurrently; gave up after {attempts} attempt(s)")]
    Conflict { code: String, attempts: u32 },
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Corrupted { key, reason } => {
                ServiceError::Room(RoomError::CorruptedRecord { code: key, reason })
            }
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<RoomError> for ServiceError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::InvalidCode(_) | RoomError::InvalidName { .. } => {
                ServiceError::InvalidInput(err.to_string())
            }
            other => ServiceError::Room(other),
        }
    }
}

impl ServiceError {
    /// Machine-readable error kind exposed to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                "store_unavailable"
            }
            ServiceError::InvalidInput(_) => "bad_request",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::AlreadyExists(_) => "already_exists",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::Room(err) => match err {
                RoomError::InvalidCode(_) | RoomError::InvalidName { .. } => "bad_request",
                RoomError::InvalidState { .. } => "invalid_state",
                RoomError::DuplicateName { .. } => "duplicate_name",
                RoomError::Forbidden { .. } => "forbidden",
                RoomError::InsufficientPlayers { .. } => "insufficient_players",
                RoomError::NotAPlayer { .. } => "not_a_player",
                RoomError::AlreadyPlayed { .. } => "already_played",
                RoomError::InvalidScore { .. } => "invalid_score",
                RoomError::CorruptedRecord { .. } => "internal",
            },
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout
        )
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("{message}")]
    BadRequest { kind: &'static str, message: String },
    /// Caller is not allowed to perform this action.
    #[error("{message}")]
    Forbidden { kind: &'static str, message: String },
    /// Requested resource not found.
    #[error("{message}")]
    NotFound { kind: &'static str, message: String },
    /// Conflict with current state.
    #[error("{message}")]
    Conflict { kind: &'static str, message: String },
    /// Service unavailable or degraded.
    #[error("{message}")]
    ServiceUnavailable { kind: &'static str, message: String },
    /// Internal server error.
    #[error("{message}")]
    Internal { kind: &'static str, message: String },
}

impl AppError {
    /// Build a bad-request error for malformed input.
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest {
            kind: "bad_request",
            message: message.into(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest { kind, .. }
            | AppError::Forbidden { kind, .. }
            | AppError::NotFound { kind, .. }
            | AppError::Conflict { kind, .. }
            | AppError::ServiceUnavailable { kind, .. }
            | AppError::Internal { kind, .. } => *kind,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            ServiceError::Unavailable(_) | ServiceError::Degraded | ServiceError::Timeout => {
                AppError::ServiceUnavailable { kind, message }
            }
            ServiceError::InvalidInput(_) => AppError::BadRequest { kind, message },
            ServiceError::NotFound(_) => AppError::NotFound { kind, message },
            ServiceError::AlreadyExists(_) | ServiceError::Conflict { .. } => {
                AppError::Conflict { kind, message }
            }
            ServiceError::Room(room) => match room {
                RoomError::InvalidCode(_)
                | RoomError::InvalidName { .. }
                | RoomError::InvalidScore { .. } => AppError::BadRequest { kind, message },
                RoomError::Forbidden { .. } | RoomError::NotAPlayer { .. } => {
                    AppError::Forbidden { kind, message }
                }
                RoomError::InvalidState { .. }
                | RoomError::DuplicateName { .. }
                | RoomError::InsufficientPlayers { .. }
                | RoomError::AlreadyPlayed { .. } => AppError::Conflict { kind, message },
                RoomError::CorruptedRecord { .. } => AppError::Internal { kind, message },
            },
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::bad_request(format!("validation failed: {}", err))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

/// Error payload returned with every non-2xx response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable description.
    pub error: String,
    /// Stable machine-readable category, e.g. `duplicate_name`.
    pub kind: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let payload = Json(ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        });

        (status, payload).into_response()
    }
}
