//! # dcert-store — Transactional Document Store
//!
//! The issuance protocol needs three things from its store: multi-record
//! transactions, an atomic conditional "stamp if unstamped" update, and
//! bulk insert. [`DocumentStore`] and [`StoreTx`] expose those plus the
//! read-only lookups behind verification, listing and statistics, with two
//! implementations:
//!
//! - [`MemoryStore`]: a single-writer in-process store for development and
//!   tests. A transaction works on a staged copy and replaces the tables
//!   on commit.
//! - [`PgStore`]: PostgreSQL via `sqlx`, with embedded migrations.
//!
//! ## Transaction Discipline
//!
//! A [`StoreTx`] must end in [`StoreTx::commit`] or [`StoreTx::abort`].
//! Dropping one without either rolls it back, so a cancelled request never
//! leaves a transaction open.

pub mod error;
pub mod memory;
pub mod postgres;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcert_core::{BatchRootRecord, Bytes32, CertificateRecord, Course, Graduate};
use serde::Serialize;
use uuid::Uuid;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::{init_pool, PgStore};

/// Which releasable courses a commit selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CourseFilter {
    /// Restrict to one course.
    pub course_id: Option<Uuid>,
    /// Restrict to one institute.
    pub institute_id: Option<Uuid>,
}

/// Which certificates a listing returns.
///
/// Unset fields do not constrain. `recipient_email` is a case-insensitive
/// exact match; the `*_contains` fields are case-insensitive substring
/// matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateFilter {
    pub issuer_id: Option<Uuid>,
    pub recipient_email: Option<String>,
    pub recipient_name_contains: Option<String>,
    pub recipient_email_contains: Option<String>,
    pub course_name_contains: Option<String>,
}

impl CertificateFilter {
    /// Whether `record` satisfies every set condition.
    pub fn matches(&self, record: &CertificateRecord) -> bool {
        fn contains(field: &Option<String>, needle: &Option<String>) -> bool {
            match needle {
                None => true,
                Some(n) => field
                    .as_deref()
                    .is_some_and(|f| f.to_lowercase().contains(&n.to_lowercase())),
            }
        }
        self.issuer_id.map_or(true, |id| id == record.issuer_id)
            && self.recipient_email.as_deref().map_or(true, |email| {
                record
                    .recipient_email
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(email))
            })
            && contains(&record.recipient_name, &self.recipient_name_contains)
            && contains(&record.recipient_email, &self.recipient_email_contains)
            && contains(&record.course_name, &self.course_name_contains)
    }
}

/// Listing order: newest `issue_date` first (missing dates last), then
/// newest record, then uuid.
pub fn listing_order(a: &CertificateRecord, b: &CertificateRecord) -> Ordering {
    b.issue_date
        .cmp(&a.issue_date)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.certificate_uuid.cmp(&b.certificate_uuid))
}

/// Inclusive time window and optional institute for issuance statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub institute_id: Option<Uuid>,
}

/// Certificates issued and revoked by one institute within a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstituteStats {
    pub institute_id: Uuid,
    pub issued: u64,
    pub revoked: u64,
}

/// Non-transactional access to the store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

    async fn certificate(&self, uuid: Uuid) -> Result<Option<CertificateRecord>, StoreError>;

    async fn batch_root(&self, root: &Bytes32) -> Result<Option<BatchRootRecord>, StoreError>;

    /// Attach a ledger transaction hash to already-committed certificates.
    /// Returns the number of records updated.
    async fn set_transaction_hash(&self, uuids: &[Uuid], tx_hash: &str)
        -> Result<u64, StoreError>;

    /// Certificates matching `filter`, in [`listing_order`].
    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<CertificateRecord>, StoreError>;

    /// Issued and revoked counts per institute, ordered by institute id.
    async fn issuance_stats(&self, query: &StatsQuery) -> Result<Vec<InstituteStats>, StoreError>;

    /// Cheap liveness check against the backing database.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// One open store transaction.
#[async_trait]
pub trait StoreTx: Send {
    /// Courses in a releasable status matching `filter`.
    async fn releasable_courses(&mut self, filter: &CourseFilter) -> Result<Vec<Course>, StoreError>;

    /// Graduates of the given courses that carry no certificate yet.
    async fn unconsumed_graduates(&mut self, course_ids: &[Uuid])
        -> Result<Vec<Graduate>, StoreError>;

    /// Set `certificate_uuid` on a graduate only if it has none.
    ///
    /// Returns `false` when the graduate was already stamped (or is gone).
    /// A single conditional update, never read-then-write.
    async fn stamp_graduate(
        &mut self,
        graduate_id: Uuid,
        certificate_uuid: Uuid,
    ) -> Result<bool, StoreError>;

    async fn mark_course_issued(&mut self, course_id: Uuid) -> Result<(), StoreError>;

    async fn insert_batch_root(&mut self, record: &BatchRootRecord) -> Result<(), StoreError>;

    /// Bulk insert.
    async fn insert_certificates(&mut self, records: &[CertificateRecord])
        -> Result<(), StoreError>;

    /// Read a certificate and lock it for the rest of the transaction.
    async fn certificate_for_update(
        &mut self,
        uuid: Uuid,
    ) -> Result<Option<CertificateRecord>, StoreError>;

    /// Flag the graduate that produced `certificate_uuid` as revoked.
    async fn revoke_graduate(&mut self, certificate_uuid: Uuid) -> Result<bool, StoreError>;

    /// Flag a certificate revoked. `revoked_at` is kept if already set.
    /// Returns the updated record.
    async fn revoke_certificate(
        &mut self,
        uuid: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<Option<CertificateRecord>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
