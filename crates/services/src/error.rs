use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Everything that can end a request inside a hop. None of these are retried.
#[derive(Debug, Error)]
pub enum HopError {
    #[error("malformed request body: {0}")]
    Decode(String),

    #[error("{target} call failed: {reason}")]
    Downstream { target: String, reason: String },

    #[error("{target} call timed out after {timeout:?}")]
    Timeout { target: String, timeout: Duration },

    #[error("{0}")]
    SimulatedSaveFailure(String),
}

impl HopError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HopError::Decode(_) => StatusCode::BAD_REQUEST,
            HopError::Downstream { .. }
            | HopError::Timeout { .. }
            | HopError::SimulatedSaveFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Clients only see the status code; the detail lives on the span.
impl IntoResponse for HopError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}

pub fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, HopError> {
    serde_json::from_slice(body).map_err(|e| HopError::Decode(e.to_string()))
}
