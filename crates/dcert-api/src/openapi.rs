//! # OpenAPI Specification Assembly
//!
//! Assembles the utoipa-documented routes into one OpenAPI document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "dcert API",
        version = "0.3.0",
        description = "Batch issuance of certificates anchored as Merkle roots on a ledger, with revocation and public verification.",
        license(name = "BUSL-1.1")
    ),
    paths(
        crate::routes::certificates::commit_batch,
        crate::routes::certificates::revoke_certificate,
        crate::routes::certificates::verify_certificate,
        crate::routes::certificates::export_artifact,
        crate::routes::certificates::issuance_stats,
        crate::routes::certificates::list_certificates,
        crate::routes::metrics::metrics,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::certificates::CommitBatchRequest,
        crate::routes::certificates::CommitBatchResponse,
        crate::routes::certificates::RevokeRequest,
        crate::routes::certificates::RevokeResponse,
        crate::routes::certificates::ArtifactBody,
        crate::routes::certificates::VerifyResponse,
        crate::routes::certificates::InstituteCounts,
        crate::routes::certificates::StatsResponse,
        crate::routes::certificates::ListParams,
        crate::routes::certificates::CertificateListItem,
        crate::routes::metrics::MetricsResponse,
    )),
    tags(
        (name = "certificates", description = "Certificate issuance, revocation and verification"),
        (name = "operations", description = "Operator endpoints"),
    )
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json — Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/v1/certificates",
            "/v1/certificates/batches",
            "/v1/certificates/{uuid}/revoke",
            "/v1/certificates/verify",
            "/v1/certificates/{uuid}/artifact",
            "/v1/certificates/stats",
            "/v1/metrics",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }
}
