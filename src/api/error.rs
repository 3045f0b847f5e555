use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use super::models::ErrorResponse;
use super::validation::InvokeValidationError;
use crate::ledger::LedgerError;
use crate::pipeline::RunError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Run(err) if err.is_rejection() => StatusCode::BAD_REQUEST,
            ApiError::Run(RunError::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Run(RunError::WorkListing(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Run(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "invalid-payload",
            ApiError::NotFound(_) => "not-found",
            ApiError::Run(err) => err.code(),
            ApiError::Internal(_) => "internal-error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<InvokeValidationError> for ApiError {
    fn from(value: InvokeValidationError) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        ApiError::Internal(value.to_string())
    }
}
