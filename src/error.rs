use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Authentication failed")]
    AuthError,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The message a client is allowed to see. Database details never leave the server.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal => "Internal server error".to_string(),
            Self::AuthError => "Unauthorized".to_string(),
            Self::NotFound => "Not found".to_string(),
            Self::Forbidden(msg) | Self::BadRequest(msg) | Self::Conflict(msg) => msg.clone(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::AuthError => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Database(e) => tracing::error!(error = %e, "Database error"),
            Self::AuthError => tracing::debug!("Authentication failed"),
            Self::Forbidden(msg) => tracing::debug!(message = %msg, "Forbidden"),
            Self::NotFound => tracing::debug!("Resource not found"),
            Self::BadRequest(msg) => tracing::debug!(message = %msg, "Bad request"),
            Self::Conflict(msg) => tracing::debug!(message = %msg, "Conflict"),
            Self::Internal => tracing::error!("Internal server error occurred"),
        }

        let body = Json(json!({
            "error": self.public_message()
        }));

        (self.status(), body).into_response()
    }
}
