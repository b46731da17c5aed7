//! # Error Types
//!
//! Structured errors for canonicalization and primitive validation, built
//! with `thiserror`. No `Box<dyn Error>`, no `.unwrap()` outside tests.

use thiserror::Error;

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical payloads; use string or integer: {0}")]
    FloatRejected(f64),

    /// JSON serialization or parsing failed during canonicalization.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Validation errors for primitive newtypes.
///
/// These carry the invalid input and the expected format so that operators
/// can diagnose malformed artifacts and configuration without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A 32-byte hex value was malformed.
    #[error("invalid bytes32 value: \"{0}\" (expected 0x followed by 64 hex chars)")]
    InvalidBytes32(String),

    /// An issue status code was not one of `P`, `R`, `E`, `I`.
    #[error("invalid issue status: \"{0}\" (expected one of P, R, E, I)")]
    InvalidIssueStatus(String),
}
