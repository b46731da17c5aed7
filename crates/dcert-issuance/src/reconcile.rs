//! # Transaction-Hash Reconciliation
//!
//! After a batch commits, every certificate in it is patched with the
//! ledger transaction hash that anchored its root. The patch runs as a
//! detached task after the store commit: a failure leaves valid
//! certificates without a transaction reference, is logged at `warn` and
//! counted, and never fails the commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dcert_store::DocumentStore;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Counters for the best-effort patch step.
#[derive(Debug, Default)]
pub struct ReconcileMetrics {
    patched_batches: AtomicU64,
    patched_records: AtomicU64,
    failed_batches: AtomicU64,
}

/// Point-in-time copy of [`ReconcileMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSnapshot {
    pub patched_batches: u64,
    pub patched_records: u64,
    pub failed_batches: u64,
}

impl ReconcileMetrics {
    pub fn snapshot(&self) -> ReconcileSnapshot {
        ReconcileSnapshot {
            patched_batches: self.patched_batches.load(Ordering::Relaxed),
            patched_records: self.patched_records.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
        }
    }
}

/// Spawn the patch of `uuids` with `tx_hash`.
pub(crate) fn spawn_patch(
    store: Arc<dyn DocumentStore>,
    metrics: Arc<ReconcileMetrics>,
    uuids: Vec<Uuid>,
    tx_hash: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match store.set_transaction_hash(&uuids, &tx_hash).await {
            Ok(updated) => {
                metrics.patched_batches.fetch_add(1, Ordering::Relaxed);
                metrics.patched_records.fetch_add(updated, Ordering::Relaxed);
                if updated as usize != uuids.len() {
                    tracing::warn!(
                        tx_hash = %tx_hash,
                        expected = uuids.len(),
                        updated,
                        "transaction hash patched on fewer certificates than committed"
                    );
                } else {
                    tracing::debug!(tx_hash = %tx_hash, updated, "transaction hash patched");
                }
            }
            Err(e) => {
                metrics.failed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    tx_hash = %tx_hash,
                    certificates = uuids.len(),
                    error = %e,
                    "failed to patch transaction hash; certificates remain valid without it"
                );
            }
        }
    })
}
