//! # Issuance Service
//!
//! Holds the two external systems the orchestrators coordinate: the
//! document store and the ledger. Both are built once at process start
//! and injected here; the service itself is cheap to clone and is shared
//! by every request.

use std::fmt;
use std::sync::Arc;

use dcert_core::Bytes32;
use dcert_ledger::{Ledger, LedgerError};
use dcert_store::{DocumentStore, StoreTx};

use crate::reconcile::{ReconcileMetrics, ReconcileSnapshot};

/// Entry point for commit, revoke, verify, export and statistics.
#[derive(Clone)]
pub struct IssuanceService {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) ledger: Arc<dyn Ledger>,
    pub(crate) metrics: Arc<ReconcileMetrics>,
}

impl IssuanceService {
    pub fn new(store: Arc<dyn DocumentStore>, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            store,
            ledger,
            metrics: Arc::new(ReconcileMetrics::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Counters of the post-commit transaction-hash patch.
    pub fn reconcile_metrics(&self) -> ReconcileSnapshot {
        self.metrics.snapshot()
    }
}

impl fmt::Debug for IssuanceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuanceService")
            .field("store", &self.store.name())
            .field("ledger", &self.ledger.name())
            .finish()
    }
}

/// Roll back `tx`, logging (not raising) a failed rollback.
pub(crate) async fn abort(tx: Box<dyn StoreTx>, operation: &'static str) {
    if let Err(e) = tx.abort().await {
        tracing::error!(operation, error = %e, "store transaction rollback failed");
    }
}

/// Log a failed ledger write before the local transaction is rolled back.
///
/// Failures after submission leave a transaction that may still be mined;
/// those are logged at `error` so the operator can repeat the call.
pub(crate) fn log_ledger_write_failure(function: &'static str, word: &Bytes32, err: &LedgerError) {
    if err.is_pre_submission() {
        tracing::warn!(function, %word, error = %err, "ledger write refused; rolling back");
    } else {
        tracing::error!(
            function,
            %word,
            error = %err,
            "ledger write outcome unknown or failed after submission; rolling back, repeat to reconcile"
        );
    }
}
