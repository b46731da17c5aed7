//! # Persisted Records
//!
//! The document-store shape of the issuance system.
//!
//! ## Lifecycle
//!
//! ```text
//! Graduate (certificate_uuid = None)  ──commit──▶  Graduate (stamped, immutable)
//!                                                    │
//!                  CertificateRecord + BatchRootRecord created atomically
//!                                                    │
//!                                     revocation is the only later mutation
//! ```
//!
//! Field names serialize in camelCase to match the artifact file format and
//! the HTTP surface.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::digest::Bytes32;
use crate::error::ValidationError;

/// Issuance status of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueStatus {
    /// Graduates are still being prepared; not eligible for issuance.
    #[serde(rename = "P")]
    Pending,
    /// Approved for certificate issuance.
    #[serde(rename = "R")]
    Released,
    /// Reopened after issuance so that late graduates can be issued.
    #[serde(rename = "E")]
    Extended,
    /// At least one certificate has been issued.
    #[serde(rename = "I")]
    Issued,
}

impl IssueStatus {
    /// Single-letter storage code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "P",
            Self::Released => "R",
            Self::Extended => "E",
            Self::Issued => "I",
        }
    }

    /// Whether graduates under a course in this status may be consumed.
    pub fn is_releasable(&self) -> bool {
        matches!(self, Self::Released | Self::Extended)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P" => Ok(Self::Pending),
            "R" => Ok(Self::Released),
            "E" => Ok(Self::Extended),
            "I" => Ok(Self::Issued),
            other => Err(ValidationError::InvalidIssueStatus(other.to_string())),
        }
    }
}

/// One entry of a course's ordered signatory list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signatory {
    /// Display position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no: Option<i32>,
    /// Signature image reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Printed signer name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign_name: Option<String>,
}

/// A course whose graduates receive certificates.
///
/// Owned by the external CRUD layer; the orchestrator only reads it and
/// flips `issue_status` to [`IssueStatus::Issued`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub course: String,
    pub date_of_study_start: Option<String>,
    pub date_of_study_end: Option<String>,
    /// Certificate expiry as an ISO date or datetime.
    pub date_of_expire_cert: Option<String>,
    pub institute_name: Option<String>,
    /// `YYYYMMDD`.
    pub issue_date: Option<String>,
    /// `YYYYMMDD`.
    pub expire_date: Option<String>,
    pub layout_id: Option<String>,
    pub sign_name: Option<String>,
    #[serde(default)]
    pub signatories: Vec<Signatory>,
    pub template_id: Option<Uuid>,
    pub issue_status: IssueStatus,
    /// Creator of the course; becomes the issuer of its certificates.
    pub created_by: Uuid,
}

/// An eligible source record: one graduate of one course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graduate {
    pub id: Uuid,
    pub course_id: Uuid,
    pub institute_id: Uuid,
    pub title_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    /// Set exactly once, by the commit that consumed this record.
    pub certificate_uuid: Option<Uuid>,
    #[serde(default)]
    pub certificate_revoked: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Graduate {
    /// Whether a commit may still consume this record.
    pub fn is_unconsumed(&self) -> bool {
        self.certificate_uuid.is_none()
    }
}

/// Inclusion proof material attached to a certificate.
///
/// `leaf` is the certificate's content hash (the raw `bytes32` value, not
/// the hashed tree node); `proofs` is the sibling path from leaf to `root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionSignature {
    pub root: Bytes32,
    pub proofs: Vec<Bytes32>,
    pub leaf: Bytes32,
}

/// An issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    #[serde(rename = "certificateUUID")]
    pub certificate_uuid: Uuid,
    pub course_name: Option<String>,
    pub institute_id: Uuid,
    pub title_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub institute_name: Option<String>,
    pub issue_date: Option<String>,
    /// The canonical payload, exactly as hashed.
    pub certificate_json: String,
    pub certificate_hash: Bytes32,
    pub signature: InclusionSignature,
    pub certificate_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    /// References the [`BatchRootRecord`] this certificate was issued under.
    pub tree_root: Bytes32,
    /// Ledger transaction that anchored the root; patched after commit.
    pub transaction_hash: Option<String>,
    pub issuer_id: Uuid,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// One committed batch: the Merkle root and its audit dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRootRecord {
    pub root: Bytes32,
    pub tree_dump: serde_json::Value,
    pub root_revoked: bool,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
