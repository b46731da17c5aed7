//! # PostgreSQL Store
//!
//! Tables are created by the embedded migrations in `migrations/`. Every
//! `bytes32` value is stored as its `0x`-prefixed hex string, so rows can
//! be compared by eye with artifacts and block explorers. Inclusion
//! signatures and tree dumps are JSONB.
//!
//! ## Concurrency
//!
//! Transactions run at the default READ COMMITTED level. The graduate stamp
//! is a single `UPDATE … WHERE certificate_uuid IS NULL`: a concurrent
//! commit that stamped the same row first makes ours match zero rows once
//! its transaction commits. `certificate_for_update` takes a row lock so
//! two revocations of one certificate are serialized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dcert_core::{
    BatchRootRecord, Bytes32, CertificateRecord, Course, Graduate, InclusionSignature,
    IssueStatus, Signatory,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::{
    CertificateFilter, CourseFilter, DocumentStore, InstituteStats, StatsQuery, StoreError,
    StoreTx,
};

/// Rows per multi-row INSERT; keeps bind parameters well under the
/// protocol limit of 65535.
const INSERT_CHUNK: usize = 1_000;

const CERTIFICATE_COLUMNS: &str = "certificate_uuid, course_name, institute_id, title_name, \
     first_name, last_name, recipient_name, recipient_email, institute_name, issue_date, \
     certificate_json, certificate_hash, signature, certificate_revoked, revoked_at, tree_root, \
     transaction_hash, issuer_id, created_by, created_at";

const COURSE_COLUMNS: &str = "id, institute_id, course, date_of_study_start, date_of_study_end, \
     date_of_expire_cert, institute_name, issue_date, expire_date, layout_id, sign_name, \
     signatories, template_id, issue_status, created_by";

const GRADUATE_COLUMNS: &str = "id, course_id, institute_id, title_name, first_name, last_name, \
     recipient_name, recipient_email, certificate_uuid, certificate_revoked, created_by, created_at";

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, StoreError> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set, using the in-memory store. \
                 Certificates will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;
    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// [`DocumentStore`] backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or replace a course. Used by fixtures and import tooling.
    pub async fn put_course(&self, c: &Course) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO courses (id, institute_id, course, date_of_study_start, date_of_study_end,
                 date_of_expire_cert, institute_name, issue_date, expire_date, layout_id,
                 sign_name, signatories, template_id, issue_status, created_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             ON CONFLICT (id) DO UPDATE SET issue_status = EXCLUDED.issue_status,
                 updated_at = now()",
        )
        .bind(c.id)
        .bind(c.institute_id)
        .bind(&c.course)
        .bind(&c.date_of_study_start)
        .bind(&c.date_of_study_end)
        .bind(&c.date_of_expire_cert)
        .bind(&c.institute_name)
        .bind(&c.issue_date)
        .bind(&c.expire_date)
        .bind(&c.layout_id)
        .bind(&c.sign_name)
        .bind(Json(&c.signatories))
        .bind(c.template_id)
        .bind(c.issue_status.as_str())
        .bind(c.created_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a graduate. Used by fixtures and import tooling.
    pub async fn put_graduate(&self, g: &Graduate) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO graduates (id, course_id, institute_id, title_name, first_name,
                 last_name, recipient_name, recipient_email, certificate_uuid,
                 certificate_revoked, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(g.id)
        .bind(g.course_id)
        .bind(g.institute_id)
        .bind(&g.title_name)
        .bind(&g.first_name)
        .bind(&g.last_name)
        .bind(&g.recipient_name)
        .bind(&g.recipient_email)
        .bind(g.certificate_uuid)
        .bind(g.certificate_revoked)
        .bind(g.created_by)
        .bind(g.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::from_write(e, &format!("graduate {}", g.id)))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn certificate(&self, uuid: Uuid) -> Result<Option<CertificateRecord>, StoreError> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE certificate_uuid = $1"
        ))
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CertificateRow::into_record).transpose()
    }

    async fn batch_root(&self, root: &Bytes32) -> Result<Option<BatchRootRecord>, StoreError> {
        let row = sqlx::query_as::<_, BatchRootRow>(
            "SELECT root, tree_dump, root_revoked, created_by, created_at
             FROM batch_roots WHERE root = $1",
        )
        .bind(root.to_hex())
        .fetch_optional(&self.pool)
        .await?;
        row.map(BatchRootRow::into_record).transpose()
    }

    async fn set_transaction_hash(
        &self,
        uuids: &[Uuid],
        tx_hash: &str,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE certificates SET transaction_hash = $1 WHERE certificate_uuid = ANY($2)",
        )
        .bind(tx_hash)
        .bind(uuids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_certificates(
        &self,
        filter: &CertificateFilter,
    ) -> Result<Vec<CertificateRecord>, StoreError> {
        let rows = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates
             WHERE ($1::uuid IS NULL OR issuer_id = $1)
               AND ($2::text IS NULL OR lower(recipient_email) = lower($2))
               AND ($3::text IS NULL OR recipient_name ILIKE $3)
               AND ($4::text IS NULL OR recipient_email ILIKE $4)
               AND ($5::text IS NULL OR course_name ILIKE $5)
             ORDER BY issue_date DESC NULLS LAST, created_at DESC, certificate_uuid"
        ))
        .bind(filter.issuer_id)
        .bind(&filter.recipient_email)
        .bind(filter.recipient_name_contains.as_deref().map(contains_pattern))
        .bind(filter.recipient_email_contains.as_deref().map(contains_pattern))
        .bind(filter.course_name_contains.as_deref().map(contains_pattern))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CertificateRow::into_record).collect()
    }

    async fn issuance_stats(&self, query: &StatsQuery) -> Result<Vec<InstituteStats>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, i64, i64)>(
            "SELECT institute_id,
                    COUNT(*) FILTER (WHERE created_at BETWEEN $1 AND $2),
                    COUNT(*) FILTER (WHERE revoked_at BETWEEN $1 AND $2)
             FROM certificates
             WHERE ($3::uuid IS NULL OR institute_id = $3)
               AND (created_at BETWEEN $1 AND $2 OR revoked_at BETWEEN $1 AND $2)
             GROUP BY institute_id
             ORDER BY institute_id",
        )
        .bind(query.from)
        .bind(query.to)
        .bind(query.institute_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(institute_id, issued, revoked)| InstituteStats {
                institute_id,
                issued: u64::try_from(issued).unwrap_or(0),
                revoked: u64::try_from(revoked).unwrap_or(0),
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

/// An open PostgreSQL transaction. Rolled back on drop unless committed.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn releasable_courses(&mut self, filter: &CourseFilter) -> Result<Vec<Course>, StoreError> {
        let rows = sqlx::query_as::<_, CourseRow>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses
             WHERE issue_status IN ('R', 'E')
               AND ($1::uuid IS NULL OR id = $1)
               AND ($2::uuid IS NULL OR institute_id = $2)
             ORDER BY id"
        ))
        .bind(filter.course_id)
        .bind(filter.institute_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(CourseRow::into_record).collect()
    }

    async fn unconsumed_graduates(
        &mut self,
        course_ids: &[Uuid],
    ) -> Result<Vec<Graduate>, StoreError> {
        let rows = sqlx::query_as::<_, GraduateRow>(&format!(
            "SELECT {GRADUATE_COLUMNS} FROM graduates
             WHERE course_id = ANY($1) AND certificate_uuid IS NULL
             ORDER BY created_at, id"
        ))
        .bind(course_ids)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(GraduateRow::into_record).collect())
    }

    async fn stamp_graduate(
        &mut self,
        graduate_id: Uuid,
        certificate_uuid: Uuid,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE graduates SET certificate_uuid = $1
             WHERE id = $2 AND certificate_uuid IS NULL",
        )
        .bind(certificate_uuid)
        .bind(graduate_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_course_issued(&mut self, course_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE courses SET issue_status = 'I', updated_at = now() WHERE id = $1")
            .bind(course_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_batch_root(&mut self, record: &BatchRootRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO batch_roots (root, tree_dump, root_revoked, created_by, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(record.root.to_hex())
        .bind(&record.tree_dump)
        .bind(record.root_revoked)
        .bind(record.created_by)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_write(e, &format!("batch root {}", record.root)))?;
        Ok(())
    }

    async fn insert_certificates(
        &mut self,
        records: &[CertificateRecord],
    ) -> Result<(), StoreError> {
        for chunk in records.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO certificates ({CERTIFICATE_COLUMNS}) "));
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(r.certificate_uuid)
                    .push_bind(r.course_name.clone())
                    .push_bind(r.institute_id)
                    .push_bind(r.title_name.clone())
                    .push_bind(r.first_name.clone())
                    .push_bind(r.last_name.clone())
                    .push_bind(r.recipient_name.clone())
                    .push_bind(r.recipient_email.clone())
                    .push_bind(r.institute_name.clone())
                    .push_bind(r.issue_date.clone())
                    .push_bind(r.certificate_json.clone())
                    .push_bind(r.certificate_hash.to_hex())
                    .push_bind(Json(r.signature.clone()))
                    .push_bind(r.certificate_revoked)
                    .push_bind(r.revoked_at)
                    .push_bind(r.tree_root.to_hex())
                    .push_bind(r.transaction_hash.clone())
                    .push_bind(r.issuer_id)
                    .push_bind(r.created_by)
                    .push_bind(r.created_at);
            });
            qb.build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| StoreError::from_write(e, "certificate"))?;
        }
        Ok(())
    }

    async fn certificate_for_update(
        &mut self,
        uuid: Uuid,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            "SELECT {CERTIFICATE_COLUMNS} FROM certificates
             WHERE certificate_uuid = $1 FOR UPDATE"
        ))
        .bind(uuid)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CertificateRow::into_record).transpose()
    }

    async fn revoke_graduate(&mut self, certificate_uuid: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE graduates SET certificate_revoked = TRUE WHERE certificate_uuid = $1",
        )
        .bind(certificate_uuid)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_certificate(
        &mut self,
        uuid: Uuid,
        revoked_at: DateTime<Utc>,
    ) -> Result<Option<CertificateRecord>, StoreError> {
        let row = sqlx::query_as::<_, CertificateRow>(&format!(
            "UPDATE certificates
             SET certificate_revoked = TRUE, revoked_at = COALESCE(revoked_at, $2)
             WHERE certificate_uuid = $1
             RETURNING {CERTIFICATE_COLUMNS}"
        ))
        .bind(uuid)
        .bind(revoked_at)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(CertificateRow::into_record).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// `ILIKE` pattern matching `needle` anywhere, with its wildcards escaped.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn parse_word(column: &str, raw: &str) -> Result<Bytes32, StoreError> {
    Bytes32::from_hex(raw).map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

#[derive(sqlx::FromRow)]
struct CourseRow {
    id: Uuid,
    institute_id: Uuid,
    course: String,
    date_of_study_start: Option<String>,
    date_of_study_end: Option<String>,
    date_of_expire_cert: Option<String>,
    institute_name: Option<String>,
    issue_date: Option<String>,
    expire_date: Option<String>,
    layout_id: Option<String>,
    sign_name: Option<String>,
    signatories: Json<Vec<Signatory>>,
    template_id: Option<Uuid>,
    issue_status: String,
    created_by: Uuid,
}

impl CourseRow {
    fn into_record(self) -> Result<Course, StoreError> {
        let issue_status: IssueStatus = self
            .issue_status
            .trim()
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("course {}: {e}", self.id)))?;
        Ok(Course {
            id: self.id,
            institute_id: self.institute_id,
            course: self.course,
            date_of_study_start: self.date_of_study_start,
            date_of_study_end: self.date_of_study_end,
            date_of_expire_cert: self.date_of_expire_cert,
            institute_name: self.institute_name,
            issue_date: self.issue_date,
            expire_date: self.expire_date,
            layout_id: self.layout_id,
            sign_name: self.sign_name,
            signatories: self.signatories.0,
            template_id: self.template_id,
            issue_status,
            created_by: self.created_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct GraduateRow {
    id: Uuid,
    course_id: Uuid,
    institute_id: Uuid,
    title_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    recipient_name: Option<String>,
    recipient_email: Option<String>,
    certificate_uuid: Option<Uuid>,
    certificate_revoked: bool,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl GraduateRow {
    fn into_record(self) -> Graduate {
        Graduate {
            id: self.id,
            course_id: self.course_id,
            institute_id: self.institute_id,
            title_name: self.title_name,
            first_name: self.first_name,
            last_name: self.last_name,
            recipient_name: self.recipient_name,
            recipient_email: self.recipient_email,
            certificate_uuid: self.certificate_uuid,
            certificate_revoked: self.certificate_revoked,
            created_by: self.created_by,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BatchRootRow {
    root: String,
    tree_dump: serde_json::Value,
    root_revoked: bool,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl BatchRootRow {
    fn into_record(self) -> Result<BatchRootRecord, StoreError> {
        Ok(BatchRootRecord {
            root: parse_word("batch_roots.root", &self.root)?,
            tree_dump: self.tree_dump,
            root_revoked: self.root_revoked,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CertificateRow {
    certificate_uuid: Uuid,
    course_name: Option<String>,
    institute_id: Uuid,
    title_name: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    recipient_name: Option<String>,
    recipient_email: Option<String>,
    institute_name: Option<String>,
    issue_date: Option<String>,
    certificate_json: String,
    certificate_hash: String,
    signature: Json<InclusionSignature>,
    certificate_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
    tree_root: String,
    transaction_hash: Option<String>,
    issuer_id: Uuid,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl CertificateRow {
    fn into_record(self) -> Result<CertificateRecord, StoreError> {
        Ok(CertificateRecord {
            certificate_uuid: self.certificate_uuid,
            course_name: self.course_name,
            institute_id: self.institute_id,
            title_name: self.title_name,
            first_name: self.first_name,
            last_name: self.last_name,
            recipient_name: self.recipient_name,
            recipient_email: self.recipient_email,
            institute_name: self.institute_name,
            issue_date: self.issue_date,
            certificate_json: self.certificate_json,
            certificate_hash: parse_word("certificates.certificate_hash", &self.certificate_hash)?,
            signature: self.signature.0,
            certificate_revoked: self.certificate_revoked,
            revoked_at: self.revoked_at,
            tree_root: parse_word("certificates.tree_root", &self.tree_root)?,
            transaction_hash: self.transaction_hash,
            issuer_id: self.issuer_id,
            created_by: self.created_by,
            created_at: self.created_at,
        })
    }
}
