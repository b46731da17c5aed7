//! # Operator Metrics
//!
//! `GET /v1/metrics` reports the in-process request counters and the
//! counters of the best-effort transaction-hash patch. Admin only.

use axum::extract::State;
use axum::routing::get;
use axum::{Extension, Json, Router};
use dcert_issuance::{ReconcileSnapshot, Role};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Caller;
use crate::error::{AppError, ErrorBody};
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Counter snapshot.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub requests: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    /// Transaction-hash patch counters: `patchedBatches`, `patchedRecords`,
    /// `failedBatches`.
    #[schema(value_type = Object)]
    pub reconcile: ReconcileSnapshot,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/metrics", get(metrics))
}

/// GET /v1/metrics — Request and reconciliation counters.
#[utoipa::path(
    get,
    path = "/v1/metrics",
    responses(
        (status = 200, description = "Counter snapshot", body = MetricsResponse),
        (status = 403, description = "Caller is not an admin", body = ErrorBody),
    ),
    tag = "operations"
)]
pub(crate) async fn metrics(
    State(state): State<AppState>,
    Extension(api): Extension<ApiMetrics>,
    Caller(caller): Caller,
) -> Result<Json<MetricsResponse>, AppError> {
    caller.require(Role::Admin)?;
    Ok(Json(MetricsResponse {
        requests: api.requests(),
        client_errors: api.client_errors(),
        server_errors: api.server_errors(),
        reconcile: state.service.reconcile_metrics(),
    }))
}
