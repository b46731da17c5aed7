//! # Certificate Artifact
//!
//! The portable, offline-verifiable unit handed to certificate holders:
//!
//! ```json
//! {
//!   "certificateUUID": "…",
//!   "certificateJson": { …canonical payload as a JSON object… },
//!   "certificateHash": "0x…",
//!   "signature": { "root": "0x…", "proofs": ["0x…"], "leaf": "0x…" }
//! }
//! ```
//!
//! Any independent verifier must accept precisely this shape. The payload is
//! embedded as an object, not a string; its hash is recomputed by
//! canonicalizing that object.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canonical::CanonicalBytes;
use crate::digest::{content_hash, Bytes32};
use crate::error::CanonicalizationError;
use crate::record::{CertificateRecord, InclusionSignature};

/// A certificate in its portable file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateArtifact {
    #[serde(rename = "certificateUUID")]
    pub certificate_uuid: Uuid,
    #[serde(rename = "certificateJson")]
    pub certificate_json: serde_json::Value,
    #[serde(rename = "certificateHash")]
    pub certificate_hash: Bytes32,
    pub signature: InclusionSignature,
}

impl CertificateArtifact {
    /// Build the artifact for a stored certificate.
    pub fn from_record(record: &CertificateRecord) -> Result<Self, CanonicalizationError> {
        Ok(Self {
            certificate_uuid: record.certificate_uuid,
            certificate_json: serde_json::from_str(&record.certificate_json)?,
            certificate_hash: record.certificate_hash,
            signature: record.signature.clone(),
        })
    }

    /// Recompute the content hash of the embedded payload.
    pub fn recompute_hash(&self) -> Result<Bytes32, CanonicalizationError> {
        Ok(content_hash(&CanonicalBytes::new(&self.certificate_json)?))
    }

    /// Whether the payload hash, the claimed hash and the signed leaf agree.
    ///
    /// A payload that cannot be canonicalized is treated as not matching.
    pub fn is_self_consistent(&self) -> bool {
        match self.recompute_hash() {
            Ok(h) => h == self.certificate_hash && h == self.signature.leaf,
            Err(_) => false,
        }
    }

    /// Parse an artifact from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn artifact_for(payload: serde_json::Value) -> CertificateArtifact {
        let hash = content_hash(&CanonicalBytes::new(&payload).unwrap());
        CertificateArtifact {
            certificate_uuid: Uuid::new_v4(),
            certificate_json: payload,
            certificate_hash: hash,
            signature: InclusionSignature {
                root: hash,
                proofs: vec![],
                leaf: hash,
            },
        }
    }

    #[test]
    fn consistent_artifact_passes() {
        let a = artifact_for(json!({"firstName": "Ann", "course": "Rust 101"}));
        assert!(a.is_self_consistent());
    }

    #[test]
    fn tampered_payload_fails() {
        let mut a = artifact_for(json!({"firstName": "Ann", "course": "Rust 101"}));
        a.certificate_json["course"] = json!("Rust 102");
        assert!(!a.is_self_consistent());
    }

    #[test]
    fn leaf_mismatch_fails() {
        let mut a = artifact_for(json!({"firstName": "Ann"}));
        a.signature.leaf = Bytes32::new([9; 32]);
        assert!(!a.is_self_consistent());
    }

    #[test]
    fn file_format_keys() {
        let a = artifact_for(json!({"firstName": "Ann"}));
        let text = serde_json::to_string(&a).unwrap();
        for key in ["certificateUUID", "certificateJson", "certificateHash", "signature", "proofs"] {
            assert!(text.contains(key), "missing {key}");
        }
        let back = CertificateArtifact::from_json(&text).unwrap();
        assert_eq!(back, a);
    }
}
