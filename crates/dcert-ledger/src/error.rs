//! # Ledger Error Types
//!
//! The ledger boundary reports a closed set of failure kinds. Reverts carry
//! the contract's reason string; transport failures are kept apart from
//! them so callers can tell "the contract said no" from "the node is down".

use thiserror::Error;

use crate::fee::Wei;

/// Errors from ledger reads and writes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The contract reverted the call.
    #[error("contract reverted: {reason}")]
    Reverted {
        /// Decoded revert reason, or the node's message when undecodable.
        reason: String,
    },

    /// The node rejected the request for a reason other than a revert.
    #[error("node rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The node could not be reached or answered with a transport error.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// Pre-flight guard: the estimated fee is above the caller's cap.
    #[error("transaction fee exceeds allowed fee: estimated {estimated} ether, max {max} ether")]
    FeeExceeded { estimated: Wei, max: Wei },

    /// The transaction was mined with a failure status; the fee was spent.
    #[error("transaction {tx_hash} was mined with failure status")]
    TransactionFailed { tx_hash: String },

    /// No receipt appeared within the configured wait.
    #[error("no receipt for transaction {tx_hash} after {waited_secs}s")]
    ReceiptTimeout { tx_hash: String, waited_secs: u64 },

    /// The node answered with something that is not a valid response.
    #[error("invalid ledger response: {0}")]
    InvalidResponse(String),

    /// The configured chain or contract does not match what the node reports.
    #[error("ledger misconfigured: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether the failure happened before anything reached the chain.
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            Self::Reverted { .. }
                | Self::Rejected { .. }
                | Self::Unavailable(_)
                | Self::FeeExceeded { .. }
                | Self::Config(_)
        )
    }
}
