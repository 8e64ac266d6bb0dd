use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Malformed locator: {0}")]
    MalformedLocator(String),

    #[error("Invalid import: {0}")]
    InvalidImport(String),

    #[error("Flow has no steps")]
    EmptyFlow,

    #[error("Scheduled time must be in the future")]
    InvalidSchedule,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            EngineError::ElementNotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            EngineError::MalformedLocator(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            EngineError::InvalidImport(_) => (StatusCode::BAD_REQUEST, "Invalid Import"),
            EngineError::EmptyFlow => (StatusCode::BAD_REQUEST, "Empty Flow"),
            EngineError::InvalidSchedule => (StatusCode::BAD_REQUEST, "Invalid Schedule"),
            EngineError::Browser(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Browser Error"),
            EngineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
