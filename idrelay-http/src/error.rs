//! Error handling for idrelay-http
//!
//! Maps core errors onto HTTP statuses and a `{"error": ...}` JSON body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use idrelay_core::{dispatch::DispatchError, store::StoreError};
use serde_json::json;

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Request store error
    Store(StoreError),

    /// Rejected session event
    Dispatch(DispatchError),

    /// Malformed client input
    BadRequest(String),

    /// Internal error
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err)
    }
}

impl PartialEq<StatusCode> for AppError {
    fn eq(&self, status_code: &StatusCode) -> bool {
        let (error_status, _) = self.status_and_message();
        &error_status == status_code
    }
}

impl AppError {
    /// Get the status code and error message for this error
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Store(err @ StoreError::NotFound { .. }) => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            Self::Store(err @ StoreError::AlreadyResolved { .. }) => {
                (StatusCode::CONFLICT, err.to_string())
            }
            Self::Dispatch(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
