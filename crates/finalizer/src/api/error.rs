use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::error::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Answered with 200 so metadata consumers render a placeholder.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(message) => ApiError::NotFound(message),
            Error::Validation(message) => ApiError::InvalidParameter(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::InvalidParameter(msg) => (StatusCode::BAD_REQUEST, "invalid_parameter", msg),
            ApiError::NotFound(msg) => (StatusCode::OK, "not_found", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "metadata request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = Json(json!({
            "error": error_type,
            "message": message,
        }));

        (status, body).into_response()
    }
}
