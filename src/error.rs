use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Storage error: {0}")]
    StoreError(#[from] StoreError),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] WebSocketError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    ConflictError(String),
}

impl AppError {
    /// Machine-stable code carried in every error body.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::AuthError(AuthError::InvalidCredentials) => "invalid_credentials",
            AppError::StoreError(_) => "storage_failure",
            AppError::WebSocketError(_) => "websocket_failure",
            AppError::ConfigError(_) => "configuration_error",
            AppError::InternalError(_) => "internal_error",
            AppError::ValidationError(_) => "missing_fields",
            AppError::ConflictError(_) => "username_taken",
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let response = json!({
            "ok": false,
            "error": {
                "status": status.as_u16(),
                "reason": self.reason(),
                "message": self.to_string()
            }
        });
        HttpResponse::build(status).json(response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ConflictError(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O failure on collection {collection}: {source}")]
    Io {
        collection: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document in collection {collection}: {source}")]
    Serialization {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum WebSocketError {
    #[error("Connection {0} is not registered")]
    UnknownConnection(uuid::Uuid),
}
