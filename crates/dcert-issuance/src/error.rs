//! # Issuance Error Taxonomy
//!
//! The closed set of failure kinds the orchestrators report. Store and
//! ledger driver errors are converted here, at the orchestrator boundary;
//! nothing downstream inspects message strings.

use dcert_core::CanonicalizationError;
use dcert_crypto::MerkleError;
use dcert_ledger::{FeeParseError, LedgerError, Wei};
use dcert_store::StoreError;
use thiserror::Error;

/// Errors from the issuance orchestrators.
#[derive(Error, Debug)]
pub enum IssuanceError {
    /// The request itself is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Nothing eligible, or no such record visible to the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller's role does not permit the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A payload hash does not match the claimed hash or the signed leaf.
    #[error("certificate data conflict: {0}")]
    DataConflict(String),

    /// The ledger does not accept the inclusion proof.
    #[error("certificate verification failed")]
    VerificationFailed,

    /// Pre-flight fee guard tripped; nothing was submitted.
    #[error("transaction fee exceeds allowed fee: estimated {estimated} ether, max {max} ether")]
    FeeExceeded { estimated: Wei, max: Wei },

    /// The contract reverted, or the transaction was mined with failure status.
    #[error("ledger transaction failed: {0}")]
    LedgerTransactionFailed(String),

    /// The ledger node could not be reached or answered nonsense.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The document-store transaction could not be completed and was rolled back.
    #[error("store transaction aborted: {0}")]
    StoreTransactionAborted(String),
}

impl IssuanceError {
    /// Stable machine-readable kind, used in logs and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::DataConflict(_) => "data_conflict",
            Self::VerificationFailed => "verification_failed",
            Self::FeeExceeded { .. } => "fee_exceeded",
            Self::LedgerTransactionFailed(_) => "ledger_transaction_failed",
            Self::LedgerUnavailable(_) => "ledger_unavailable",
            Self::StoreTransactionAborted(_) => "store_transaction_aborted",
        }
    }
}

impl From<LedgerError> for IssuanceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::FeeExceeded { estimated, max } => Self::FeeExceeded { estimated, max },
            LedgerError::Reverted { .. }
            | LedgerError::Rejected { .. }
            | LedgerError::TransactionFailed { .. }
            | LedgerError::ReceiptTimeout { .. } => Self::LedgerTransactionFailed(err.to_string()),
            LedgerError::Unavailable(_)
            | LedgerError::InvalidResponse(_)
            | LedgerError::Config(_) => Self::LedgerUnavailable(err.to_string()),
        }
    }
}

impl From<StoreError> for IssuanceError {
    fn from(err: StoreError) -> Self {
        Self::StoreTransactionAborted(err.to_string())
    }
}

impl From<MerkleError> for IssuanceError {
    fn from(err: MerkleError) -> Self {
        match err {
            MerkleError::Serialization(_) => Self::StoreTransactionAborted(err.to_string()),
            _ => Self::InvalidInput(err.to_string()),
        }
    }
}

impl From<FeeParseError> for IssuanceError {
    fn from(err: FeeParseError) -> Self {
        Self::InvalidInput(format!("maxTransactionFee: {err}"))
    }
}

impl From<CanonicalizationError> for IssuanceError {
    fn from(err: CanonicalizationError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
