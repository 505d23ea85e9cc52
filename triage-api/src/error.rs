use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use triage_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    ServiceUnavailable(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::ServiceUnavailable(msg) => {
                tracing::error!("Order store unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Order store unavailable, retry".to_string())
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            CoreError::NotFoundError(_) => AppError::NotFoundError(err.to_string()),
            CoreError::InvariantViolation { .. } => AppError::ConflictError(err.to_string()),
            CoreError::TransientStoreError(_) => AppError::ServiceUnavailable(err.to_string()),
            CoreError::StoreIntegrityError(_) => AppError::InternalServerError(err.to_string()),
        }
    }
}

/// Malformed bodies get the same JSON error shape as every other 400.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}
