//! # dcert-issuance — Certificate Issuance Orchestration
//!
//! Coordinates the document store and the ledger, two systems that fail
//! independently and share no transaction coordinator. Correctness rests
//! on ordering: mutate the store inside a transaction, submit to the
//! ledger, and only then commit the store. A ledger failure aborts the
//! store transaction.
//!
//! ## Operations
//!
//! | Operation | Entry point |
//! |-----------|-------------|
//! | Batch commit | [`IssuanceService::commit_batch`] |
//! | Revocation | [`IssuanceService::revoke_certificate`] |
//! | Verification | [`IssuanceService::verify`], [`verify_artifact_at`] |
//! | Artifact export | [`IssuanceService::export_artifact`] |
//! | Listing | [`IssuanceService::list_certificates`] |
//! | Statistics | [`IssuanceService::issuance_stats`] |
//!
//! Every operation runs within the caller's request; there is no
//! background worker apart from the post-commit transaction-hash patch
//! (see [`reconcile`]). Callers bound each call with their own timeout.
//! Dropping a call mid-flight drops its store transaction, which rolls it
//! back.

pub mod caller;
pub mod commit;
pub mod error;
pub mod export;
pub mod list;
pub mod payload;
pub mod reconcile;
pub mod revoke;
pub mod service;
pub mod stats;
pub mod verify;

pub use caller::{CallerIdentity, Role};
pub use commit::{BatchCommit, CommitReceipt, CommitRequest};
pub use error::IssuanceError;
pub use list::{CertificateSummary, ListQuery};
pub use payload::CertificatePayload;
pub use reconcile::{ReconcileMetrics, ReconcileSnapshot};
pub use revoke::RevokeReceipt;
pub use service::IssuanceService;
pub use stats::StatsReport;
pub use verify::{
    check_integrity, check_offline, is_expired, verify_artifact_at, CertificateStatus,
    VerificationReport,
};
