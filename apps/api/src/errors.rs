use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ingestion::IngestError;
use crate::resilience::{ErrorKind, TaskError};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),
}

impl From<TaskError> for AppError {
    fn from(err: TaskError) -> Self {
        match err.kind {
            ErrorKind::InvalidInput => AppError::Validation(err.message),
            ErrorKind::Unrecoverable => AppError::UnprocessableEntity(err.message),
            ErrorKind::Transient => AppError::Upstream(err.message),
            ErrorKind::Cancelled => AppError::Cancelled(err.message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Upstream(msg) => {
                tracing::warn!("Upstream error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "An external service failed, please try again".to_string(),
                )
            }
            AppError::Cancelled(msg) => (
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_CANCELLED",
                msg.clone(),
            ),
            AppError::Ingest(e) => {
                tracing::error!("Ingestion error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "The listings could not be saved".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_error_kinds_map_to_statuses() {
        let cases = [
            (TaskError::invalid_input("bad"), StatusCode::BAD_REQUEST),
            (TaskError::unrecoverable("no text"), StatusCode::UNPROCESSABLE_ENTITY),
            (TaskError::transient("timed out"), StatusCode::BAD_GATEWAY),
            (TaskError::cancelled("gone"), StatusCode::REQUEST_TIMEOUT),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }
}
