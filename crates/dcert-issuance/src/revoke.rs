//! # Revocation
//!
//! Revocation flags the certificate and the graduate that produced it, then
//! revokes the certificate's leaf on the ledger, all inside one store
//! transaction. The local flags commit only once the ledger confirms the
//! leaf is revoked, either by a mined transaction or by reporting it was
//! already revoked. Any other ledger failure rolls the flags back.
//!
//! Repeating a revocation is safe: the ledger answers "already revoked",
//! the original revocation timestamp is kept, and the response carries an
//! empty transaction hash. The same path heals a revocation whose ledger
//! transaction was mined but whose store commit failed.

use chrono::Utc;
use dcert_core::{content_hash, Bytes32, CanonicalBytes, CertificateRecord};
use dcert_ledger::{LedgerOutcome, Wei};
use dcert_store::StoreTx;
use serde::Serialize;
use uuid::Uuid;

use crate::caller::{CallerIdentity, Role};
use crate::error::IssuanceError;
use crate::service::{abort, log_ledger_write_failure, IssuanceService};

/// Result of a successful revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeReceipt {
    /// Empty when the leaf was already revoked on the ledger.
    pub transaction_hash: String,
    #[serde(rename = "certificateUUID")]
    pub certificate_uuid: Uuid,
    pub certificate_hash: Bytes32,
}

impl IssuanceService {
    /// Revoke one certificate locally and on the ledger.
    pub async fn revoke_certificate(
        &self,
        caller: &CallerIdentity,
        certificate_uuid: Uuid,
        max_fee: Option<Wei>,
    ) -> Result<RevokeReceipt, IssuanceError> {
        caller.require(Role::Issuer)?;

        let mut tx = self.store.begin().await?;
        let record = match stage_revocation(&mut *tx, caller, certificate_uuid).await {
            Ok(record) => record,
            Err(e) => {
                abort(tx, "revocation").await;
                return Err(e);
            }
        };
        let leaf = record.certificate_hash;

        let outcome = match self.ledger.revoke_leaf(&leaf, max_fee).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log_ledger_write_failure("revokeLeaf", &leaf, &e);
                abort(tx, "revocation").await;
                return Err(e.into());
            }
        };

        if let Err(e) = tx.commit().await {
            tracing::error!(
                certificate_uuid = %certificate_uuid,
                leaf = %leaf,
                tx_hash = outcome.tx_hash().unwrap_or_default(),
                error = %e,
                "leaf revoked on ledger but store commit failed; repeat the revocation"
            );
            return Err(e.into());
        }

        match &outcome {
            LedgerOutcome::Applied { tx_hash } => tracing::info!(
                certificate_uuid = %certificate_uuid,
                leaf = %leaf,
                tx_hash = %tx_hash,
                "certificate revoked"
            ),
            LedgerOutcome::AlreadyApplied { .. } => tracing::info!(
                certificate_uuid = %certificate_uuid,
                leaf = %leaf,
                revoked_at = ?record.revoked_at,
                "certificate was already revoked"
            ),
        }

        Ok(RevokeReceipt {
            transaction_hash: outcome.tx_hash().unwrap_or_default().to_string(),
            certificate_uuid,
            certificate_hash: leaf,
        })
    }
}

/// Flag the certificate and its graduate inside `tx`.
async fn stage_revocation(
    tx: &mut dyn StoreTx,
    caller: &CallerIdentity,
    certificate_uuid: Uuid,
) -> Result<CertificateRecord, IssuanceError> {
    let not_found = || IssuanceError::NotFound(format!("certificate {certificate_uuid}"));

    let current = tx
        .certificate_for_update(certificate_uuid)
        .await?
        .ok_or_else(not_found)?;
    if !caller.is_admin() && current.issuer_id != caller.user_id {
        return Err(not_found());
    }
    check_stored_hash(&current)?;

    if !tx.revoke_graduate(certificate_uuid).await? {
        tracing::warn!(
            certificate_uuid = %certificate_uuid,
            "no graduate references this certificate; revoking the certificate only"
        );
    }
    tx.revoke_certificate(certificate_uuid, Utc::now())
        .await?
        .ok_or_else(not_found)
}

/// The stored payload must still hash to the stored content hash and leaf.
pub(crate) fn check_stored_hash(record: &CertificateRecord) -> Result<(), IssuanceError> {
    let canonical = CanonicalBytes::from_json_str(&record.certificate_json)
        .map_err(|e| IssuanceError::DataConflict(e.to_string()))?;
    let recomputed = content_hash(&canonical);
    if recomputed != record.certificate_hash || record.signature.leaf != record.certificate_hash {
        return Err(IssuanceError::DataConflict(format!(
            "stored certificate {} does not match its hash",
            record.certificate_uuid
        )));
    }
    Ok(())
}
