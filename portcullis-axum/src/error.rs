use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use portcullis::PortcullisError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid session token")]
    InvalidSession,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<PortcullisError> for AuthError {
    fn from(err: PortcullisError) -> Self {
        match err {
            PortcullisError::SessionError(_) => AuthError::InvalidSession,
            PortcullisError::AuthError(msg)
            | PortcullisError::StorageError(msg)
            | PortcullisError::ConfigurationError(msg)
            | PortcullisError::EventError(msg) => AuthError::InternalError(msg),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AuthError::InvalidSession => (StatusCode::UNAUTHORIZED, "Invalid session"),
            AuthError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AuthError::Unavailable(ref msg) => {
                tracing::error!(error = %msg, "Service unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
            }
            AuthError::InternalError(ref msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
