use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use querygate_contracts::{ErrorBody, ErrorResponse};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Could not validate credentials")]
    Forbidden,
    #[error("{message}")]
    EngineFailure {
        message: &'static str,
        details: String,
    },
    #[error("{message}")]
    EngineTimeout {
        message: &'static str,
        details: String,
    },
    #[error("failed to read audit logs: {0}")]
    LogRead(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            ApiError::EngineFailure { details, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "engine_failure",
                Some(details.clone()),
            ),
            ApiError::EngineTimeout { details, .. } => (
                StatusCode::GATEWAY_TIMEOUT,
                "engine_timeout",
                Some(details.clone()),
            ),
            ApiError::LogRead(_) => (StatusCode::INTERNAL_SERVER_ERROR, "log_read_error", None),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
                details: details.map(Value::String),
            },
        };
        (status, Json(body)).into_response()
    }
}
