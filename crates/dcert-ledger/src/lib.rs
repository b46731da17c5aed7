//! # dcert-ledger — Certificate Registry Ledger Client
//!
//! The ledger is the root of trust: a deployed registry contract records
//! every anchored Merkle root and every revoked leaf, and answers
//! `verifyLeaf` for anyone.
//!
//! ## Operation Classes
//!
//! - **Read** ([`Ledger::verify_leaf`]): a stateless `eth_call`. No fee, no
//!   state change. A revert carrying the "revoked" reason is reported as
//!   [`LeafStatus::Revoked`]; other reverts and transport failures stay
//!   errors, and stay distinct from each other.
//! - **Write** ([`Ledger::add_root`], [`Ledger::revoke_leaf`]): estimate gas,
//!   inflate by 10%, price it, refuse with [`LedgerError::FeeExceeded`] if
//!   the caller's cap is lower, submit, then block until mined. A revert
//!   whose reason says the write is already in effect becomes
//!   [`LedgerOutcome::AlreadyApplied`].
//!
//! ## Architecture
//!
//! [`Ledger`] is **sealed**: the production [`EvmLedger`] and the in-process
//! [`MockLedger`] are the only implementations. Both are constructed once
//! at process start and shared behind an `Arc<dyn Ledger>`.

pub mod abi;
pub mod config;
pub mod error;
pub mod evm;
pub mod fee;
pub mod mock;
pub mod signer;

use async_trait::async_trait;
use dcert_core::Bytes32;
use serde::Serialize;

pub use config::{ConfigError, LedgerConfig, RevertReasons};
pub use error::LedgerError;
pub use evm::EvmLedger;
pub use fee::{FeeParseError, Wei};
pub use mock::{MockFailure, MockLedger};
pub use signer::{SignerError, TxSigner};

/// Result of a read-verify against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafStatus {
    /// The proof reaches an anchored root and the leaf is not revoked.
    Included,
    /// The proof does not reach an anchored root.
    NotIncluded,
    /// The leaf has been revoked on-chain.
    Revoked,
}

/// Successful outcome of a state-changing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// Mined with success status.
    Applied { tx_hash: String },
    /// The contract reported the change is already in effect; nothing was
    /// submitted.
    AlreadyApplied { reason: String },
}

impl LedgerOutcome {
    /// Transaction hash, if a transaction was mined.
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Self::Applied { tx_hash } => Some(tx_hash),
            Self::AlreadyApplied { .. } => None,
        }
    }
}

/// The certificate registry contract.
///
/// Sealed: only implementations within this crate are permitted.
///
/// ## Invariant
///
/// Write methods return `Ok` only once the change is durably in effect on
/// the ledger (mined with success status, or already present).
#[async_trait]
pub trait Ledger: private::Sealed + Send + Sync {
    /// `verifyLeaf(root, proof, leaf)`.
    async fn verify_leaf(
        &self,
        root: &Bytes32,
        proof: &[Bytes32],
        leaf: &Bytes32,
    ) -> Result<LeafStatus, LedgerError>;

    /// `addRoot(root)`, refused before submission if the estimated fee
    /// exceeds `max_fee`.
    async fn add_root(
        &self,
        root: &Bytes32,
        max_fee: Option<Wei>,
    ) -> Result<LedgerOutcome, LedgerError>;

    /// `revokeLeaf(leaf)`, refused before submission if the estimated fee
    /// exceeds `max_fee`.
    async fn revoke_leaf(
        &self,
        leaf: &Bytes32,
        max_fee: Option<Wei>,
    ) -> Result<LedgerOutcome, LedgerError>;

    /// Establish (or confirm) the node connection.
    async fn ready(&self) -> Result<(), LedgerError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::EvmLedger {}
    impl Sealed for super::MockLedger {}
}
