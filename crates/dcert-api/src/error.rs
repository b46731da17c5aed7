//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps [`IssuanceError`] kinds to HTTP status codes and returns JSON error
//! bodies with a machine-readable code and a message. Server-side failure
//! details are logged and replaced by a fixed message in the response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dcert_issuance::IssuanceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "FEE_EXCEEDED").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request body or query could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A failure reported by the issuance orchestrators.
    #[error(transparent)]
    Issuance(#[from] IssuanceError),

    /// The operation did not finish within the request timeout (504).
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    pub(crate) fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Issuance(e) => match e {
                IssuanceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                IssuanceError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
                IssuanceError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                IssuanceError::DataConflict(_) => (StatusCode::CONFLICT, "DATA_CONFLICT"),
                IssuanceError::VerificationFailed => {
                    (StatusCode::BAD_REQUEST, "VERIFICATION_FAILED")
                }
                IssuanceError::FeeExceeded { .. } => (StatusCode::FORBIDDEN, "FEE_EXCEEDED"),
                IssuanceError::LedgerTransactionFailed(_) => {
                    (StatusCode::BAD_GATEWAY, "LEDGER_TRANSACTION_FAILED")
                }
                IssuanceError::LedgerUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "LEDGER_UNAVAILABLE")
                }
                IssuanceError::StoreTransactionAborted(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "STORE_TRANSACTION_ABORTED")
                }
            },
        }
    }

    /// The message returned to the client. `None` for server-side failures,
    /// whose detail stays in the logs.
    fn public_message(&self) -> Option<String> {
        match self {
            Self::Internal(_)
            | Self::Issuance(IssuanceError::LedgerTransactionFailed(_))
            | Self::Issuance(IssuanceError::LedgerUnavailable(_))
            | Self::Issuance(IssuanceError::StoreTransactionAborted(_)) => None,
            Self::Issuance(e) => Some(e.to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match self.public_message() {
            Some(message) => message,
            None => {
                tracing::error!(error = %self, code, "request failed");
                match status {
                    StatusCode::BAD_GATEWAY => "The ledger rejected the transaction".to_string(),
                    StatusCode::SERVICE_UNAVAILABLE => "The ledger is unavailable".to_string(),
                    _ => "An internal error occurred".to_string(),
                }
            }
        };

        (status, Json(ErrorBody::new(code, message))).into_response()
    }
}
