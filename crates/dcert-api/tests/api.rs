//! # Integration Tests for dcert-api
//!
//! Drives the full router (auth, routes, error mapping) against the
//! in-memory store and the mock ledger.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use dcert_api::state::{AppConfig, AppState};
use dcert_core::{Course, Graduate, IssueStatus};
use dcert_issuance::IssuanceService;
use dcert_ledger::{Ledger, MockFailure, MockLedger};
use dcert_store::{DocumentStore, MemoryStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-secret";

struct TestApp {
    router: axum::Router,
    store: MemoryStore,
    ledger: Arc<MockLedger>,
    issuer: Uuid,
    institute: Uuid,
}

fn test_app() -> TestApp {
    let store = MemoryStore::new();
    let ledger = Arc::new(MockLedger::new());
    let service = IssuanceService::new(
        Arc::new(store.clone()) as Arc<dyn DocumentStore>,
        ledger.clone() as Arc<dyn Ledger>,
    );
    let config = AppConfig {
        auth_token: Some(SECRET.to_string()),
        ..AppConfig::default()
    };
    TestApp {
        router: dcert_api::app(AppState::new(service, config)),
        store,
        ledger,
        issuer: Uuid::new_v4(),
        institute: Uuid::new_v4(),
    }
}

impl TestApp {
    fn issuer_token(&self) -> String {
        format!("Bearer issuer:{}:{}:{SECRET}", self.issuer, self.institute)
    }

    fn admin_token(&self) -> String {
        format!("Bearer admin:{}::{SECRET}", Uuid::new_v4())
    }

    async fn seed_course(&self, graduates: usize) -> Course {
        let course = Course {
            id: Uuid::new_v4(),
            institute_id: self.institute,
            course: "Distributed Systems".into(),
            date_of_study_start: Some("2024-01-08".into()),
            date_of_study_end: Some("2024-05-31".into()),
            date_of_expire_cert: None,
            institute_name: Some("Harbourview College".into()),
            issue_date: Some("20240610".into()),
            expire_date: None,
            layout_id: None,
            sign_name: Some("Dr. Ines Okafor".into()),
            signatories: vec![],
            template_id: None,
            issue_status: IssueStatus::Released,
            created_by: self.issuer,
        };
        self.store.put_course(course.clone()).await;
        for i in 0..graduates {
            self.store
                .put_graduate(Graduate {
                    id: Uuid::new_v4(),
                    course_id: course.id,
                    institute_id: self.institute,
                    title_name: None,
                    first_name: Some(format!("Grad{i}")),
                    last_name: Some("Moreau".into()),
                    recipient_name: None,
                    recipient_email: Some(format!("grad{i}@example.net")),
                    certificate_uuid: None,
                    certificate_revoked: false,
                    created_by: self.issuer,
                    created_at: Utc::now(),
                })
                .await;
        }
        course
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value, axum::http::HeaderMap) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, body, headers)
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("Authorization", token);
        }
        let (status, body, _) = self
            .send(builder.body(Body::from(body.to_string())).unwrap())
            .await;
        (status, body)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value, axum::http::HeaderMap) {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header("Authorization", token);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Commit a two-graduate course and return the certificate uuids.
    async fn issue_two(&self) -> Vec<Uuid> {
        let course = self.seed_course(2).await;
        let (status, _) = self
            .post(
                "/v1/certificates/batches",
                Some(&self.issuer_token()),
                json!({ "courseId": course.id }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        self.store
            .certificates()
            .await
            .into_iter()
            .map(|c| c.certificate_uuid)
            .collect()
    }
}

// -- Health Checks ------------------------------------------------------------

#[tokio::test]
async fn liveness_is_always_ok() {
    let app = test_app();
    let (status, body, _) = app.get("/health/liveness", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn readiness_reflects_ledger() {
    let app = test_app();
    let (status, _, _) = app.get("/health/readiness", None).await;
    assert_eq!(status, StatusCode::OK);

    app.ledger.set_reads_unavailable(true);
    let (status, body, _) = app.get("/health/readiness", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "NOT_READY");
}

// -- Batch commit -------------------------------------------------------------

#[tokio::test]
async fn commit_returns_created_receipt() {
    let app = test_app();
    let course = app.seed_course(3).await;

    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&app.issuer_token()),
            json!({ "courseId": course.id, "maxTransactionFee": "1" }),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["certificates"], 3);
    assert!(body["transactionHash"].as_str().unwrap().starts_with("0x"));
    let root = body["root"].as_str().unwrap();
    assert_eq!(root.len(), 66);
    assert!(app.ledger.has_root(&root.parse().unwrap()));
}

#[tokio::test]
async fn commit_requires_credentials() {
    let app = test_app();
    let course = app.seed_course(1).await;
    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            None,
            json!({ "courseId": course.id }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert_eq!(app.store.certificate_count().await, 0);
}

#[tokio::test]
async fn plain_user_cannot_commit() {
    let app = test_app();
    let course = app.seed_course(1).await;
    let token = format!("Bearer user:{}:{}:{SECRET}", Uuid::new_v4(), app.institute);
    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&token),
            json!({ "courseId": course.id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn malformed_fee_is_bad_request() {
    let app = test_app();
    let course = app.seed_course(1).await;
    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&app.issuer_token()),
            json!({ "courseId": course.id, "maxTransactionFee": "cheap" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    let app = test_app();
    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&app.issuer_token()),
            json!({ "courseId": "not-a-uuid" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn fee_cap_below_estimate_is_forbidden() {
    let app = test_app();
    let course = app.seed_course(2).await;
    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&app.issuer_token()),
            json!({ "courseId": course.id, "maxTransactionFee": "0.000000000000000001" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FEE_EXCEEDED");
    assert_eq!(app.store.certificate_count().await, 0);
    assert_eq!(app.ledger.submitted_count(), 0);
}

#[tokio::test]
async fn nothing_to_issue_is_not_found() {
    let app = test_app();
    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&app.issuer_token()),
            json!({ "courseId": Uuid::new_v4() }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn ledger_revert_is_bad_gateway_without_detail() {
    let app = test_app();
    let course = app.seed_course(1).await;
    app.ledger
        .fail_writes(MockFailure::Revert("Ownable: caller is not the owner".into()));

    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&app.issuer_token()),
            json!({ "courseId": course.id }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "LEDGER_TRANSACTION_FAILED");
    assert!(!body.to_string().contains("Ownable"));
    assert_eq!(app.store.certificate_count().await, 0);
}

#[tokio::test]
async fn ledger_outage_is_service_unavailable() {
    let app = test_app();
    let course = app.seed_course(1).await;
    app.ledger.fail_writes(MockFailure::Unavailable);

    let (status, body) = app
        .post(
            "/v1/certificates/batches",
            Some(&app.issuer_token()),
            json!({ "courseId": course.id }),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "LEDGER_UNAVAILABLE");
}

// -- Artifact export and verification ------------------------------------------

#[tokio::test]
async fn exported_artifact_is_public_and_verifies() {
    let app = test_app();
    let uuids = app.issue_two().await;

    let (status, artifact, headers) = app
        .get(&format!("/v1/certificates/{}/artifact", uuids[0]), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains(&uuids[0].to_string()));
    assert_eq!(artifact["certificateUUID"], uuids[0].to_string());

    let (status, verdict) = app.post("/v1/certificates/verify", None, artifact).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["certificate"], "valid");
    assert_eq!(verdict["certificateData"]["course"], "Distributed Systems");
}

#[tokio::test]
async fn tampered_artifact_is_a_conflict() {
    let app = test_app();
    let uuids = app.issue_two().await;
    let (_, mut artifact, _) = app
        .get(&format!("/v1/certificates/{}/artifact", uuids[0]), None)
        .await;
    artifact["certificateJson"]["lastName"] = json!("Forged");

    let reads_before = app.ledger.read_count();
    let (status, body) = app.post("/v1/certificates/verify", None, artifact).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "DATA_CONFLICT");
    assert_eq!(app.ledger.read_count(), reads_before);
}

#[tokio::test]
async fn unknown_artifact_is_not_found() {
    let app = test_app();
    let (status, _, _) = app
        .get(&format!("/v1/certificates/{}/artifact", Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Revocation ---------------------------------------------------------------

#[tokio::test]
async fn revoke_then_verify_reports_revoked() {
    let app = test_app();
    let uuids = app.issue_two().await;
    let uri = format!("/v1/certificates/{}/revoke", uuids[1]);

    let (status, body) = app.post(&uri, Some(&app.issuer_token()), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["certificateUUID"], uuids[1].to_string());
    assert!(body["transactionHash"].as_str().unwrap().starts_with("0x"));

    // A repeat is idempotent and reports no new transaction.
    let (status, again) = app.post(&uri, Some(&app.issuer_token()), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["transactionHash"], "");
    assert_eq!(again["certificateHash"], body["certificateHash"]);

    let (_, artifact, _) = app
        .get(&format!("/v1/certificates/{}/artifact", uuids[1]), None)
        .await;
    let (status, verdict) = app.post("/v1/certificates/verify", None, artifact).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verdict["certificate"], "revoked");
    assert!(verdict.get("certificateData").is_none());
}

#[tokio::test]
async fn other_issuer_cannot_revoke() {
    let app = test_app();
    let uuids = app.issue_two().await;
    let stranger = format!(
        "Bearer issuer:{}:{}:{SECRET}",
        Uuid::new_v4(),
        Uuid::new_v4()
    );
    let (status, _) = app
        .post(
            &format!("/v1/certificates/{}/revoke", uuids[0]),
            Some(&stranger),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn revoke_with_malformed_uuid_is_bad_request() {
    let app = test_app();
    let (status, body) = app
        .post(
            "/v1/certificates/not-a-uuid/revoke",
            Some(&app.issuer_token()),
            json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

// -- Listing --------------------------------------------------------------------

#[tokio::test]
async fn users_list_only_certificates_sent_to_their_email() {
    let app = test_app();
    app.issue_two().await;

    let request = Request::builder()
        .uri("/v1/certificates")
        .header(
            "Authorization",
            format!("Bearer user:{}::{SECRET}", Uuid::new_v4()),
        )
        .header("X-Caller-Email", "GRAD1@example.net")
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["certificateJson"]["recipientEmail"], "grad1@example.net");
    assert_eq!(listed[0]["certificateRevoked"], false);
    assert!(listed[0]["certificateUUID"].is_string());

    let token = format!("Bearer user:{}::{SECRET}", Uuid::new_v4());
    let (status, body, _) = app.get("/v1/certificates", Some(&token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn issuer_listing_filters_and_hides_other_issuers() {
    let app = test_app();
    app.issue_two().await;

    let (status, body, _) = app
        .get("/v1/certificates?recipientEmail=GRAD0", Some(&app.issuer_token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body, _) = app
        .get("/v1/certificates?courseName=systems", Some(&app.issuer_token()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let stranger = format!(
        "Bearer issuer:{}:{}:{SECRET}",
        Uuid::new_v4(),
        app.institute
    );
    let (status, body, _) = app.get("/v1/certificates", Some(&stranger)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// -- Statistics and operations --------------------------------------------------

#[tokio::test]
async fn stats_count_issued_certificates() {
    let app = test_app();
    app.issue_two().await;
    let today = Utc::now().format("%Y-%m-%d").to_string();

    let (status, body, _) = app
        .get(
            &format!("/v1/certificates/stats?startDate={today}&endDate={today}"),
            Some(&app.issuer_token()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["institutes"][0]["instituteId"], app.institute.to_string());
    assert_eq!(body["institutes"][0]["issued"], 2);
    assert_eq!(body["institutes"][0]["revoked"], 0);
}

#[tokio::test]
async fn stats_reject_malformed_dates() {
    let app = test_app();
    let (status, _, _) = app
        .get(
            "/v1/certificates/stats?startDate=2024-13-01&endDate=2024-12-01",
            Some(&app.issuer_token()),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = app
        .get("/v1/certificates/stats", Some(&app.issuer_token()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_are_admin_only() {
    let app = test_app();
    let (status, _, _) = app.get("/v1/metrics", Some(&app.issuer_token())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body, _) = app.get("/v1/metrics", Some(&app.admin_token())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["requests"].as_u64().unwrap() >= 1);
    assert_eq!(body["clientErrors"], 1);
    assert_eq!(body["reconcile"]["failedBatches"], 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = test_app();
    let (status, body, _) = app.get("/openapi.json", Some(&app.admin_token())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/certificates/batches"].is_object());
}
