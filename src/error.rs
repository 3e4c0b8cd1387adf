use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::response::ApiResponse;

pub type AppResult<T> = Result<T, AppError>;

/// Errors shared by repositories, services and handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness violation, either detected up front or raised by the store.
    #[error("{0}")]
    AlreadyExists(String),

    /// The resource exists but belongs to another user.
    #[error("unauthorized access")]
    Unauthorized,

    #[error("invalid email or password")]
    InvalidCredentials,

    /// Missing, malformed or expired bearer token.
    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Wraps a sqlx error with the operation that produced it.
    pub fn store(context: &'static str, source: sqlx::Error) -> Self {
        Self::Store { context, source }
    }

    /// Like [`AppError::store`], but turns a unique violation into `AlreadyExists`.
    pub fn store_unique(context: &'static str, source: sqlx::Error, on_unique: &str) -> Self {
        if let Some(db_err) = source.as_database_error() {
            if db_err.is_unique_violation() {
                return Self::AlreadyExists(on_unique.to_string());
            }
        }
        Self::store(context, source)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::InvalidCredentials | Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}
