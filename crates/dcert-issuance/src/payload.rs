//! # Certificate Payload
//!
//! The content that is hashed and anchored for one graduate. It joins the
//! graduate's personal fields with the course's certificate fields and
//! deliberately leaves out everything volatile or administrative: record
//! ids of the graduate, timestamps, issue status, creators and the
//! certificate uuid itself. Absent fields are omitted rather than `null`,
//! as is an empty signatory list.

use dcert_core::{
    content_hash, Bytes32, CanonicalBytes, CanonicalizationError, Course, Graduate, Signatory,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The hashed content of one certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificatePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    pub course: String,
    pub course_id: Uuid,
    pub institute_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institute_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_study_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_study_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_expire_cert: Option<String>,
    /// `YYYYMMDD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    /// `YYYYMMDD`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign_name: Option<String>,
    #[serde(
        rename = "signatureArray",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub signatories: Vec<Signatory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_id: Option<Uuid>,
}

impl CertificatePayload {
    /// Assemble the payload for `graduate` under `course`.
    pub fn assemble(graduate: &Graduate, course: &Course) -> Self {
        Self {
            title_name: graduate.title_name.clone(),
            first_name: graduate.first_name.clone(),
            last_name: graduate.last_name.clone(),
            recipient_name: graduate.recipient_name.clone(),
            recipient_email: graduate.recipient_email.clone(),
            course: course.course.clone(),
            course_id: course.id,
            institute_id: course.institute_id,
            institute_name: course.institute_name.clone(),
            date_of_study_start: course.date_of_study_start.clone(),
            date_of_study_end: course.date_of_study_end.clone(),
            date_of_expire_cert: course.date_of_expire_cert.clone(),
            issue_date: course.issue_date.clone(),
            expire_date: course.expire_date.clone(),
            layout_id: course.layout_id.clone(),
            sign_name: course.sign_name.clone(),
            signatories: course.signatories.clone(),
            template_id: course.template_id,
        }
    }

    /// Canonical bytes and their content hash.
    pub fn seal(&self) -> Result<(CanonicalBytes, Bytes32), CanonicalizationError> {
        let canonical = CanonicalBytes::new(self)?;
        let hash = content_hash(&canonical);
        Ok((canonical, hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dcert_core::IssueStatus;

    fn course() -> Course {
        Course {
            id: Uuid::new_v4(),
            institute_id: Uuid::new_v4(),
            course: "Distributed Systems".into(),
            date_of_study_start: Some("2024-01-08".into()),
            date_of_study_end: Some("2024-03-29".into()),
            date_of_expire_cert: None,
            institute_name: Some("Chula Tech".into()),
            issue_date: Some("20240401".into()),
            expire_date: None,
            layout_id: None,
            sign_name: Some("Dr. K".into()),
            signatories: vec![],
            template_id: None,
            issue_status: IssueStatus::Released,
            created_by: Uuid::new_v4(),
        }
    }

    fn graduate(course: &Course) -> Graduate {
        Graduate {
            id: Uuid::new_v4(),
            course_id: course.id,
            institute_id: course.institute_id,
            title_name: Some("Ms.".into()),
            first_name: Some("Nok".into()),
            last_name: Some("Srisuk".into()),
            recipient_name: None,
            recipient_email: Some("nok@example.org".into()),
            certificate_uuid: None,
            certificate_revoked: false,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn administrative_fields_are_excluded() {
        let c = course();
        let g = graduate(&c);
        let v = serde_json::to_value(CertificatePayload::assemble(&g, &c)).unwrap();
        let obj = v.as_object().unwrap();
        for key in [
            "id",
            "certificateUUID",
            "certificateUuid",
            "createdBy",
            "createdAt",
            "issueStatus",
            "certificateRevoked",
        ] {
            assert!(!obj.contains_key(key), "payload leaked {key}");
        }
        assert_eq!(obj["courseId"], serde_json::json!(c.id));
        assert_eq!(obj["firstName"], "Nok");
    }

    #[test]
    fn empty_signatories_and_absent_fields_are_omitted() {
        let c = course();
        let g = graduate(&c);
        let v = serde_json::to_value(CertificatePayload::assemble(&g, &c)).unwrap();
        assert!(v.get("signatureArray").is_none());
        assert!(v.get("recipientName").is_none());
        assert!(v.get("expireDate").is_none());
    }

    #[test]
    fn signatories_are_kept_in_order() {
        let mut c = course();
        c.signatories = vec![
            Signatory {
                no: Some(2),
                signature: None,
                sign_name: Some("B".into()),
            },
            Signatory {
                no: Some(1),
                signature: None,
                sign_name: Some("A".into()),
            },
        ];
        let g = graduate(&c);
        let v = serde_json::to_value(CertificatePayload::assemble(&g, &c)).unwrap();
        let sigs = v["signatureArray"].as_array().unwrap();
        assert_eq!(sigs[0]["signName"], "B");
        assert_eq!(sigs[1]["signName"], "A");
    }

    #[test]
    fn hash_ignores_graduate_record_identity() {
        let c = course();
        let g1 = graduate(&c);
        let mut g2 = g1.clone();
        g2.id = Uuid::new_v4();
        g2.created_at = Utc::now() + chrono::Duration::days(1);
        let (_, h1) = CertificatePayload::assemble(&g1, &c).seal().unwrap();
        let (_, h2) = CertificatePayload::assemble(&g2, &c).seal().unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn hash_matches_reparsed_canonical_text() {
        let c = course();
        let g = graduate(&c);
        let (canonical, hash) = CertificatePayload::assemble(&g, &c).seal().unwrap();
        let reparsed = CanonicalBytes::from_json_str(canonical.as_str()).unwrap();
        assert_eq!(content_hash(&reparsed), hash);
    }
}
