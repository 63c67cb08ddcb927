//! Batch-level API errors
//!
//! Per-identifier failures never surface here; they are reported in the
//! `errors` partition of a successful response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// More identifiers than the configured lookup limit
    #[error("batch of {requested} identifiers exceeds the limit of {limit}")]
    TooManyIdentifiers { requested: usize, limit: usize },

    /// The lookup task did not complete
    #[error("lookup failed: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::TooManyIdentifiers { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
