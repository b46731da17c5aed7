//! # Certificate Endpoints
//!
//! ## Authenticated
//!
//! - `POST /v1/certificates/batches` — Commit all unconsumed graduates of
//!   the releasable course(s) under one ledger root.
//! - `POST /v1/certificates/:uuid/revoke` — Revoke one certificate.
//! - `GET /v1/certificates/stats` — Issued and revoked counts per institute.
//! - `GET /v1/certificates` — Certificates visible to the caller, newest
//!   first.
//!
//! ## Public
//!
//! - `POST /v1/certificates/verify` — Verify a presented artifact.
//! - `GET /v1/certificates/:uuid/artifact` — Download a certificate's
//!   artifact file.
//!
//! Commit and revoke calls are bounded by the configured request timeout.
//! A call cut off by the timeout drops its store transaction, which rolls
//! it back; a ledger write already submitted may still be mined, and
//! repeating the call then completes it.

use std::future::Future;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dcert_core::{Bytes32, CertificateArtifact};
use dcert_issuance::{
    CertificateStatus, CertificateSummary, CommitRequest, IssuanceError, ListQuery,
};
use dcert_ledger::Wei;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Caller;
use crate::error::{AppError, ErrorBody};
use crate::extractors::{extract_json, extract_path, extract_query};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Request body for a batch commit.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitBatchRequest {
    /// Restrict the commit to one course. Required for issuers.
    pub course_id: Option<Uuid>,
    /// Fee cap in ether, as a decimal string (e.g. `"0.005"`).
    #[schema(example = "0.005")]
    pub max_transaction_fee: Option<String>,
}

/// Response from a successful batch commit.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommitBatchResponse {
    /// Hash of the `addRoot` transaction; empty if the root was already anchored.
    pub transaction_hash: String,
    /// The Merkle root anchored for this batch.
    #[schema(value_type = String, example = "0x3c2a…")]
    pub root: Bytes32,
    /// Number of certificates issued.
    pub certificates: usize,
}

/// Request body for a revocation.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    /// Fee cap in ether, as a decimal string.
    pub max_transaction_fee: Option<String>,
}

/// Response from a successful revocation.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevokeResponse {
    /// Hash of the `revokeLeaf` transaction; empty if the leaf was already revoked.
    pub transaction_hash: String,
    #[serde(rename = "certificateUUID")]
    pub certificate_uuid: Uuid,
    #[schema(value_type = String)]
    pub certificate_hash: Bytes32,
}

/// The portable certificate artifact, as exported and as presented for
/// verification.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ArtifactBody {
    #[serde(rename = "certificateUUID")]
    pub certificate_uuid: Uuid,
    /// The certificate payload, as a JSON object.
    #[serde(rename = "certificateJson")]
    pub certificate_json: serde_json::Value,
    /// `"0x"` + 64 hex digits: SHA-256 of the canonical payload.
    #[serde(rename = "certificateHash")]
    pub certificate_hash: String,
    /// Inclusion proof: `{root, proofs, leaf}`.
    pub signature: serde_json::Value,
}

/// Verification verdict.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// `valid`, `expired` or `revoked`.
    #[schema(value_type = String, example = "valid")]
    pub certificate: CertificateStatus,
    /// The verified payload; absent for revoked certificates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_data: Option<serde_json::Value>,
}

/// Query parameters for issuance statistics.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsParams {
    /// First day, `YYYY-MM-DD` (UTC).
    pub start_date: String,
    /// Last day, inclusive, `YYYY-MM-DD` (UTC).
    pub end_date: String,
}

/// Counts for one institute.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstituteCounts {
    pub institute_id: Uuid,
    pub issued: u64,
    pub revoked: u64,
}

/// Issuance statistics for a date range.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub start_date: String,
    pub end_date: String,
    pub institutes: Vec<InstituteCounts>,
}

/// Query parameters for a certificate listing. Each is a case-insensitive
/// substring match.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub course_name: Option<String>,
}

/// One listed certificate.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateListItem {
    #[serde(rename = "certificateUUID")]
    pub certificate_uuid: Uuid,
    pub recipient_name: Option<String>,
    pub course_name: Option<String>,
    /// As stored on the course, e.g. `"20240401"`.
    pub issue_date: Option<String>,
    pub certificate_revoked: bool,
    /// The certificate payload, as a JSON object.
    pub certificate_json: serde_json::Value,
}

impl From<CertificateSummary> for CertificateListItem {
    fn from(s: CertificateSummary) -> Self {
        Self {
            certificate_uuid: s.certificate_uuid,
            recipient_name: s.recipient_name,
            course_name: s.course_name,
            issue_date: s.issue_date,
            certificate_revoked: s.certificate_revoked,
            certificate_json: s.certificate_json,
        }
    }
}

// ---------------------------------------------------------------------------
// Routers
// ---------------------------------------------------------------------------

/// Routes that require an authenticated caller.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/certificates", get(list_certificates))
        .route("/v1/certificates/batches", post(commit_batch))
        .route("/v1/certificates/:uuid/revoke", post(revoke_certificate))
        .route("/v1/certificates/stats", get(issuance_stats))
}

/// Routes open to anyone holding an artifact or a certificate uuid.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/v1/certificates/verify", post(verify_certificate))
        .route("/v1/certificates/:uuid/artifact", get(export_artifact))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_fee(fee: Option<&str>) -> Result<Option<Wei>, AppError> {
    fee.map(Wei::parse_ether)
        .transpose()
        .map_err(|e| AppError::from(IssuanceError::from(e)))
}

/// Run an orchestrator call under the request timeout.
async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, IssuanceError>>,
) -> Result<T, AppError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => {
            tracing::error!(
                operation,
                timeout_secs = limit.as_secs(),
                "operation timed out; its store transaction was rolled back"
            );
            Err(AppError::Timeout(limit.as_secs()))
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/certificates/batches — Commit a batch of certificates.
#[utoipa::path(
    post,
    path = "/v1/certificates/batches",
    request_body = CommitBatchRequest,
    responses(
        (status = 201, description = "Batch anchored and stored", body = CommitBatchResponse),
        (status = 400, description = "Invalid request", body = ErrorBody),
        (status = 403, description = "Role not permitted, or fee cap exceeded", body = ErrorBody),
        (status = 404, description = "Nothing to issue", body = ErrorBody),
        (status = 502, description = "Ledger transaction failed", body = ErrorBody),
        (status = 503, description = "Ledger unavailable", body = ErrorBody),
    ),
    tag = "certificates"
)]
pub(crate) async fn commit_batch(
    State(state): State<AppState>,
    Caller(caller): Caller,
    body: Result<Json<CommitBatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CommitBatchResponse>), AppError> {
    let req = extract_json(body)?;
    let request = CommitRequest {
        course_id: req.course_id,
        max_fee: parse_fee(req.max_transaction_fee.as_deref())?,
    };

    let batch = bounded(
        state.config.request_timeout,
        "batch commit",
        state.service.commit_batch(&caller, request),
    )
    .await?;

    // The transaction-hash patch runs detached; the response does not wait for it.
    let receipt = batch.receipt;
    Ok((
        StatusCode::CREATED,
        Json(CommitBatchResponse {
            transaction_hash: receipt.transaction_hash,
            root: receipt.root,
            certificates: receipt.certificates,
        }),
    ))
}

/// POST /v1/certificates/:uuid/revoke — Revoke a certificate.
#[utoipa::path(
    post,
    path = "/v1/certificates/{uuid}/revoke",
    params(("uuid" = Uuid, Path, description = "Certificate UUID")),
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "Certificate revoked", body = RevokeResponse),
        (status = 403, description = "Role not permitted, or fee cap exceeded", body = ErrorBody),
        (status = 404, description = "No such certificate visible to the caller", body = ErrorBody),
        (status = 409, description = "Stored certificate no longer matches its hash", body = ErrorBody),
        (status = 502, description = "Ledger transaction failed", body = ErrorBody),
        (status = 503, description = "Ledger unavailable", body = ErrorBody),
    ),
    tag = "certificates"
)]
pub(crate) async fn revoke_certificate(
    State(state): State<AppState>,
    Caller(caller): Caller,
    uuid: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<RevokeResponse>, AppError> {
    let certificate_uuid = extract_path(uuid)?;
    let req = extract_json(body)?;
    let max_fee = parse_fee(req.max_transaction_fee.as_deref())?;

    let receipt = bounded(
        state.config.request_timeout,
        "revocation",
        state
            .service
            .revoke_certificate(&caller, certificate_uuid, max_fee),
    )
    .await?;

    Ok(Json(RevokeResponse {
        transaction_hash: receipt.transaction_hash,
        certificate_uuid: receipt.certificate_uuid,
        certificate_hash: receipt.certificate_hash,
    }))
}

/// POST /v1/certificates/verify — Verify a presented artifact.
#[utoipa::path(
    post,
    path = "/v1/certificates/verify",
    request_body = ArtifactBody,
    responses(
        (status = 200, description = "Verdict", body = VerifyResponse),
        (status = 400, description = "Malformed artifact, or proof rejected by the ledger", body = ErrorBody),
        (status = 409, description = "Payload does not match its hash", body = ErrorBody),
        (status = 503, description = "Ledger unavailable", body = ErrorBody),
    ),
    tag = "certificates"
)]
pub(crate) async fn verify_certificate(
    State(state): State<AppState>,
    body: Result<Json<CertificateArtifact>, JsonRejection>,
) -> Result<Json<VerifyResponse>, AppError> {
    let artifact = extract_json(body)?;
    let report = state.service.verify(&artifact).await?;
    tracing::debug!(
        certificate_uuid = %artifact.certificate_uuid,
        status = ?report.certificate,
        "certificate verified"
    );
    Ok(Json(VerifyResponse {
        certificate: report.certificate,
        certificate_data: report.certificate_data,
    }))
}

/// GET /v1/certificates/:uuid/artifact — Download the artifact file.
#[utoipa::path(
    get,
    path = "/v1/certificates/{uuid}/artifact",
    params(("uuid" = Uuid, Path, description = "Certificate UUID")),
    responses(
        (status = 200, description = "Artifact file", body = ArtifactBody),
        (status = 404, description = "Unknown certificate", body = ErrorBody),
        (status = 409, description = "Stored certificate no longer matches its hash", body = ErrorBody),
    ),
    tag = "certificates"
)]
pub(crate) async fn export_artifact(
    State(state): State<AppState>,
    uuid: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let certificate_uuid = extract_path(uuid)?;
    let artifact = state.service.export_artifact(certificate_uuid).await?;
    let disposition = format!("attachment; filename=\"certificate-{certificate_uuid}.json\"");
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(artifact)))
}

/// GET /v1/certificates/stats — Issued and revoked counts per institute.
#[utoipa::path(
    get,
    path = "/v1/certificates/stats",
    params(
        ("startDate" = String, Query, description = "First day, YYYY-MM-DD"),
        ("endDate" = String, Query, description = "Last day (inclusive), YYYY-MM-DD"),
    ),
    responses(
        (status = 200, description = "Counts per institute", body = StatsResponse),
        (status = 400, description = "Malformed date range", body = ErrorBody),
        (status = 403, description = "Caller has no institute", body = ErrorBody),
    ),
    tag = "certificates"
)]
pub(crate) async fn issuance_stats(
    State(state): State<AppState>,
    Caller(caller): Caller,
    params: Result<Query<StatsParams>, QueryRejection>,
) -> Result<Json<StatsResponse>, AppError> {
    let params = extract_query(params)?;
    let report = state
        .service
        .issuance_stats(&caller, &params.start_date, &params.end_date)
        .await?;
    Ok(Json(StatsResponse {
        start_date: report.start_date,
        end_date: report.end_date,
        institutes: report
            .institutes
            .into_iter()
            .map(|s| InstituteCounts {
                institute_id: s.institute_id,
                issued: s.issued,
                revoked: s.revoked,
            })
            .collect(),
    }))
}

/// GET /v1/certificates — Certificates visible to the caller.
#[utoipa::path(
    get,
    path = "/v1/certificates",
    params(
        ("recipientName" = Option<String>, Query, description = "Substring of the recipient name"),
        ("recipientEmail" = Option<String>, Query, description = "Substring of the recipient e-mail"),
        ("courseName" = Option<String>, Query, description = "Substring of the course name"),
    ),
    responses(
        (status = 200, description = "Certificates, newest issue date first", body = [CertificateListItem]),
        (status = 403, description = "User caller without a verified e-mail address", body = ErrorBody),
        (status = 409, description = "A stored payload is unreadable", body = ErrorBody),
    ),
    tag = "certificates"
)]
pub(crate) async fn list_certificates(
    State(state): State<AppState>,
    Caller(caller): Caller,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<CertificateListItem>>, AppError> {
    let params = extract_query(params)?;
    let query = ListQuery {
        recipient_name: params.recipient_name,
        recipient_email: params.recipient_email,
        course_name: params.course_name,
    };
    let listed = state.service.list_certificates(&caller, &query).await?;
    Ok(Json(listed.into_iter().map(CertificateListItem::from).collect()))
}
