//! # Certificate Listing
//!
//! What a caller may see:
//!
//! | Role | Certificates |
//! |------|--------------|
//! | user | addressed to the caller's e-mail (case-insensitive) |
//! | issuer | issued by the caller |
//! | admin | all |
//!
//! The text filters narrow any of these by case-insensitive substring.
//! Results are newest `issueDate` first.

use dcert_core::CertificateRecord;
use dcert_store::CertificateFilter;
use serde::Serialize;
use uuid::Uuid;

use crate::caller::{CallerIdentity, Role};
use crate::error::IssuanceError;
use crate::service::IssuanceService;

/// Optional narrowing of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub course_name: Option<String>,
}

/// One listed certificate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    #[serde(rename = "certificateUUID")]
    pub certificate_uuid: Uuid,
    pub recipient_name: Option<String>,
    pub course_name: Option<String>,
    pub issue_date: Option<String>,
    pub certificate_revoked: bool,
    pub certificate_json: serde_json::Value,
}

impl CertificateSummary {
    fn from_record(record: CertificateRecord) -> Result<Self, IssuanceError> {
        let certificate_json = serde_json::from_str(&record.certificate_json).map_err(|e| {
            IssuanceError::DataConflict(format!(
                "certificate {} has an unreadable payload: {e}",
                record.certificate_uuid
            ))
        })?;
        Ok(Self {
            certificate_uuid: record.certificate_uuid,
            recipient_name: record.recipient_name,
            course_name: record.course_name,
            issue_date: record.issue_date,
            certificate_revoked: record.certificate_revoked,
            certificate_json,
        })
    }
}

impl IssuanceService {
    /// Certificates visible to `caller`, narrowed by `query`.
    pub async fn list_certificates(
        &self,
        caller: &CallerIdentity,
        query: &ListQuery,
    ) -> Result<Vec<CertificateSummary>, IssuanceError> {
        let filter = list_scope(caller, query)?;
        let records = self.store.list_certificates(&filter).await?;
        tracing::debug!(
            role = %caller.role,
            user_id = %caller.user_id,
            count = records.len(),
            "certificates listed"
        );
        records
            .into_iter()
            .map(CertificateSummary::from_record)
            .collect()
    }
}

/// Translate the caller and query into a store filter.
pub(crate) fn list_scope(
    caller: &CallerIdentity,
    query: &ListQuery,
) -> Result<CertificateFilter, IssuanceError> {
    let text = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    let mut filter = CertificateFilter {
        recipient_name_contains: text(&query.recipient_name),
        recipient_email_contains: text(&query.recipient_email),
        course_name_contains: text(&query.course_name),
        ..CertificateFilter::default()
    };
    match caller.role {
        Role::User => {
            let email = text(&caller.email).ok_or_else(|| {
                IssuanceError::Forbidden("caller has no verified e-mail address".into())
            })?;
            filter.recipient_email = Some(email);
        }
        Role::Issuer => filter.issuer_id = Some(caller.user_id),
        Role::Admin => {}
    }
    Ok(filter)
}
