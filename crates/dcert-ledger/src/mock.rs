//! # In-Process Mock Ledger
//!
//! Simulates the registry contract in memory: a set of anchored roots, a
//! set of revoked leaves, the same revert reasons, and the same fee model
//! (fixed gas estimates inflated by the usual margin, times a settable gas
//! price). Failures can be injected to exercise the orchestrators'
//! compensation paths.
//!
//! ## Warning
//!
//! Provides no ledger guarantees at all. Suitable only for development and
//! tests.

use std::collections::HashSet;

use async_trait::async_trait;
use dcert_core::Bytes32;
use dcert_crypto::{keccak256, process_proof};
use parking_lot::Mutex;

use crate::config::{LEAF_REVOKED_REASON, ROOT_EXISTS_REASON};
use crate::error::LedgerError;
use crate::fee::{estimated_fee, with_gas_margin, Wei};
use crate::{LeafStatus, Ledger, LedgerOutcome};

/// Raw gas estimate for `addRoot`.
pub const ADD_ROOT_GAS: u64 = 50_000;
/// Raw gas estimate for `revokeLeaf`.
pub const REVOKE_LEAF_GAS: u64 = 30_000;
/// Default gas price: 1 gwei.
pub const DEFAULT_GAS_PRICE: Wei = Wei(1_000_000_000);

/// A failure to inject into every subsequent write until cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Revert during estimation with this reason.
    Revert(String),
    /// Node unreachable.
    Unavailable,
    /// Mined with failure status (after the fee check).
    MinedFailure,
    /// Submitted but never mined within the wait.
    ReceiptTimeout,
}

#[derive(Debug)]
struct MockState {
    roots: HashSet<Bytes32>,
    revoked: HashSet<Bytes32>,
    gas_price: Wei,
    write_failure: Option<MockFailure>,
    reads_unavailable: bool,
    submitted: u64,
    reads: u64,
}

/// In-memory registry contract.
#[derive(Debug)]
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                roots: HashSet::new(),
                revoked: HashSet::new(),
                gas_price: DEFAULT_GAS_PRICE,
                write_failure: None,
                reads_unavailable: false,
                submitted: 0,
                reads: 0,
            }),
        }
    }

    pub fn set_gas_price(&self, price: Wei) {
        self.state.lock().gas_price = price;
    }

    /// Fee an `addRoot` would be estimated at right now.
    pub fn add_root_fee(&self) -> Wei {
        self.fee_for(ADD_ROOT_GAS)
    }

    /// Fee a `revokeLeaf` would be estimated at right now.
    pub fn revoke_leaf_fee(&self) -> Wei {
        self.fee_for(REVOKE_LEAF_GAS)
    }

    fn fee_for(&self, raw_gas: u64) -> Wei {
        let price = self.state.lock().gas_price;
        estimated_fee(with_gas_margin(raw_gas), price).unwrap_or(Wei(u128::MAX))
    }

    pub fn fail_writes(&self, failure: MockFailure) {
        self.state.lock().write_failure = Some(failure);
    }

    pub fn clear_failures(&self) {
        let mut s = self.state.lock();
        s.write_failure = None;
        s.reads_unavailable = false;
    }

    pub fn set_reads_unavailable(&self, unavailable: bool) {
        self.state.lock().reads_unavailable = unavailable;
    }

    /// Anchor a root directly, bypassing the write path.
    pub fn seed_root(&self, root: Bytes32) {
        self.state.lock().roots.insert(root);
    }

    pub fn has_root(&self, root: &Bytes32) -> bool {
        self.state.lock().roots.contains(root)
    }

    pub fn is_revoked(&self, leaf: &Bytes32) -> bool {
        self.state.lock().revoked.contains(leaf)
    }

    /// Transactions submitted (mined or not).
    pub fn submitted_count(&self) -> u64 {
        self.state.lock().submitted
    }

    pub fn read_count(&self) -> u64 {
        self.state.lock().reads
    }

    /// Shared write path: estimate, fee check, submit, mine.
    fn write(
        &self,
        raw_gas: u64,
        max_fee: Option<Wei>,
        already_applied: impl FnOnce(&MockState) -> Option<&'static str>,
        apply: impl FnOnce(&mut MockState),
    ) -> Result<LedgerOutcome, LedgerError> {
        let mut s = self.state.lock();

        match &s.write_failure {
            Some(MockFailure::Unavailable) => {
                return Err(LedgerError::Unavailable("mock ledger unavailable".into()))
            }
            Some(MockFailure::Revert(reason)) => {
                return Err(LedgerError::Reverted {
                    reason: reason.clone(),
                })
            }
            _ => {}
        }
        if let Some(reason) = already_applied(&*s) {
            return Ok(LedgerOutcome::AlreadyApplied {
                reason: reason.to_string(),
            });
        }

        let fee = estimated_fee(with_gas_margin(raw_gas), s.gas_price)
            .ok_or_else(|| LedgerError::InvalidResponse("fee estimate overflows".into()))?;
        if let Some(max) = max_fee {
            if fee > max {
                return Err(LedgerError::FeeExceeded { estimated: fee, max });
            }
        }

        s.submitted += 1;
        let mut nonce = b"mock-tx".to_vec();
        nonce.extend_from_slice(&s.submitted.to_be_bytes());
        let tx_hash = keccak256(&nonce).to_hex();

        match s.write_failure.clone() {
            Some(MockFailure::MinedFailure) => Err(LedgerError::TransactionFailed { tx_hash }),
            Some(MockFailure::ReceiptTimeout) => Err(LedgerError::ReceiptTimeout {
                tx_hash,
                waited_secs: 0,
            }),
            _ => {
                apply(&mut *s);
                Ok(LedgerOutcome::Applied { tx_hash })
            }
        }
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn verify_leaf(
        &self,
        root: &Bytes32,
        proof: &[Bytes32],
        leaf: &Bytes32,
    ) -> Result<LeafStatus, LedgerError> {
        let mut s = self.state.lock();
        s.reads += 1;
        if s.reads_unavailable {
            return Err(LedgerError::Unavailable("mock ledger unavailable".into()));
        }
        if s.revoked.contains(leaf) {
            return Ok(LeafStatus::Revoked);
        }
        if s.roots.contains(root) && process_proof(leaf, proof) == *root {
            Ok(LeafStatus::Included)
        } else {
            Ok(LeafStatus::NotIncluded)
        }
    }

    async fn add_root(
        &self,
        root: &Bytes32,
        max_fee: Option<Wei>,
    ) -> Result<LedgerOutcome, LedgerError> {
        let root = *root;
        self.write(
            ADD_ROOT_GAS,
            max_fee,
            |s| s.roots.contains(&root).then_some(ROOT_EXISTS_REASON),
            |s| {
                s.roots.insert(root);
            },
        )
    }

    async fn revoke_leaf(
        &self,
        leaf: &Bytes32,
        max_fee: Option<Wei>,
    ) -> Result<LedgerOutcome, LedgerError> {
        let leaf = *leaf;
        self.write(
            REVOKE_LEAF_GAS,
            max_fee,
            |s| s.revoked.contains(&leaf).then_some(LEAF_REVOKED_REASON),
            |s| {
                s.revoked.insert(leaf);
            },
        )
    }

    async fn ready(&self) -> Result<(), LedgerError> {
        if self.state.lock().reads_unavailable {
            return Err(LedgerError::Unavailable("mock ledger unavailable".into()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
