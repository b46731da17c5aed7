//! # Artifact Verification
//!
//! Verification trusts nothing but the artifact and the ledger:
//!
//! 1. The payload is re-canonicalized and re-hashed; the hash must equal
//!    both `certificateHash` and `signature.leaf`. A mismatch is reported
//!    as [`IssuanceError::DataConflict`] without calling the ledger.
//! 2. `verifyLeaf(root, proofs, leaf)` on the ledger decides inclusion and
//!    revocation.
//! 3. An included leaf is `expired` if its `expireDate` (`YYYYMMDD`) lies
//!    before today or its `dateOfExpireCert` lies in the past, and `valid`
//!    otherwise. Dates are evaluated in UTC.

use chrono::{DateTime, NaiveDate, Utc};
use dcert_core::CertificateArtifact;
use dcert_crypto::verify_proof;
use dcert_ledger::{LeafStatus, Ledger};
use serde::Serialize;
use serde_json::Value;

use crate::error::IssuanceError;
use crate::service::IssuanceService;

/// Verdict on a certificate that passed the local hash check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Valid,
    Expired,
    Revoked,
}

/// Verification result as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub certificate: CertificateStatus,
    /// The verified payload; absent for revoked certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_data: Option<Value>,
}

impl IssuanceService {
    /// Verify `artifact` against the ledger, as of now.
    pub async fn verify(
        &self,
        artifact: &CertificateArtifact,
    ) -> Result<VerificationReport, IssuanceError> {
        verify_artifact_at(self.ledger.as_ref(), artifact, Utc::now()).await
    }
}

/// Verify `artifact` against `ledger`, evaluating expiry at `now`.
pub async fn verify_artifact_at(
    ledger: &dyn Ledger,
    artifact: &CertificateArtifact,
    now: DateTime<Utc>,
) -> Result<VerificationReport, IssuanceError> {
    check_integrity(artifact)?;

    let sig = &artifact.signature;
    let status = ledger.verify_leaf(&sig.root, &sig.proofs, &sig.leaf).await?;
    tracing::debug!(
        certificate_uuid = %artifact.certificate_uuid,
        root = %sig.root,
        status = ?status,
        "ledger verification"
    );

    match status {
        LeafStatus::NotIncluded => Err(IssuanceError::VerificationFailed),
        LeafStatus::Revoked => Ok(VerificationReport {
            certificate: CertificateStatus::Revoked,
            certificate_data: None,
        }),
        LeafStatus::Included => {
            let certificate = if is_expired(&artifact.certificate_json, now) {
                CertificateStatus::Expired
            } else {
                CertificateStatus::Valid
            };
            Ok(VerificationReport {
                certificate,
                certificate_data: Some(artifact.certificate_json.clone()),
            })
        }
    }
}

/// The local part of verification: payload hash, claimed hash and leaf agree.
pub fn check_integrity(artifact: &CertificateArtifact) -> Result<(), IssuanceError> {
    if artifact.is_self_consistent() {
        Ok(())
    } else {
        Err(IssuanceError::DataConflict(format!(
            "payload of certificate {} does not match its hash",
            artifact.certificate_uuid
        )))
    }
}

/// Integrity plus the inclusion proof against the artifact's own root,
/// without consulting the ledger. Says nothing about whether the root was
/// anchored or the leaf revoked.
pub fn check_offline(artifact: &CertificateArtifact) -> Result<(), IssuanceError> {
    check_integrity(artifact)?;
    let sig = &artifact.signature;
    if verify_proof(&sig.root, &sig.leaf, &sig.proofs) {
        Ok(())
    } else {
        Err(IssuanceError::VerificationFailed)
    }
}

/// Whether the payload's expiry fields lie before `now`.
pub fn is_expired(payload: &Value, now: DateTime<Utc>) -> bool {
    let today = now.format("%Y%m%d").to_string();
    if let Some(expire_date) = payload.get("expireDate").and_then(Value::as_str) {
        if !expire_date.is_empty() && expire_date < today.as_str() {
            return true;
        }
    }
    payload
        .get("dateOfExpireCert")
        .and_then(Value::as_str)
        .and_then(parse_instant)
        .is_some_and(|expiry| expiry < now)
}

/// RFC 3339 datetime, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn expire_date_in_past_is_expired() {
        assert!(is_expired(&json!({"expireDate": "20240101"}), at(2024, 1, 2)));
    }

    #[test]
    fn expire_date_today_is_still_valid() {
        assert!(!is_expired(&json!({"expireDate": "20240102"}), at(2024, 1, 2)));
    }

    #[test]
    fn date_of_expire_cert_datetime() {
        let payload = json!({"dateOfExpireCert": "2024-01-02T11:00:00Z"});
        assert!(is_expired(&payload, at(2024, 1, 2)));
        let payload = json!({"dateOfExpireCert": "2024-01-02T13:00:00Z"});
        assert!(!is_expired(&payload, at(2024, 1, 2)));
    }

    #[test]
    fn date_of_expire_cert_bare_date_is_midnight_utc() {
        assert!(is_expired(
            &json!({"dateOfExpireCert": "2024-01-02"}),
            at(2024, 1, 2)
        ));
        assert!(!is_expired(
            &json!({"dateOfExpireCert": "2024-01-03"}),
            at(2024, 1, 2)
        ));
    }

    #[test]
    fn missing_or_unparseable_expiry_never_expires() {
        assert!(!is_expired(&json!({}), at(2030, 1, 1)));
        assert!(!is_expired(&json!({"dateOfExpireCert": "soon"}), at(2030, 1, 1)));
        assert!(!is_expired(&json!({"expireDate": ""}), at(2030, 1, 1)));
    }

    #[test]
    fn status_serializes_lowercase() {
        let report = VerificationReport {
            certificate: CertificateStatus::Revoked,
            certificate_data: None,
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"certificate": "revoked"})
        );
    }
}
