//! # dcert-api — HTTP Service for Certificate Issuance
//!
//! Exposes the issuance orchestrators over HTTP. Caller identity arrives
//! from the upstream authentication collaborator in the bearer token and
//! is checked here against a shared secret.
//!
//! ## API Surface
//!
//! | Route                                   | Auth   | Module                     |
//! |-----------------------------------------|--------|----------------------------|
//! | `POST /v1/certificates/batches`         | yes    | [`routes::certificates`]   |
//! | `POST /v1/certificates/:uuid/revoke`    | yes    | [`routes::certificates`]   |
//! | `GET /v1/certificates/stats`            | yes    | [`routes::certificates`]   |
//! | `GET /v1/metrics`                       | admin  | [`routes::metrics`]        |
//! | `POST /v1/certificates/verify`          | no     | [`routes::certificates`]   |
//! | `GET /v1/certificates/:uuid/artifact`   | no     | [`routes::certificates`]   |
//! | `GET /health/liveness`, `/health/readiness` | no | this module             |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Generated with utoipa derive macros, served at `/openapi.json`.

pub mod auth;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};

use crate::auth::AuthConfig;
use crate::error::ErrorBody;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health checks, verification and artifact export are mounted outside the
/// auth middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::certificates::router())
        .merge(routes::metrics::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(axum::Extension(auth_config));

    // Public certificate routes.
    let public = routes::certificates::public_router();

    // Unauthenticated health checks.
    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new()
        .merge(health)
        .merge(public)
        .merge(api)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(middleware::tracing_layer::layer())
        .layer(axum::Extension(metrics))
        .with_state(state)
}

/// Liveness check: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: 200 once the store answers and the ledger connection
/// is established.
async fn readiness(State(state): State<AppState>) -> Response {
    if let Err(e) = state.service.store().ping().await {
        tracing::warn!(error = %e, "readiness: store unreachable");
        return not_ready("document store unreachable");
    }
    if let Err(e) = state.service.ledger().ready().await {
        tracing::warn!(error = %e, ledger = state.service.ledger().name(), "readiness: ledger unreachable");
        return not_ready("ledger unreachable");
    }
    "ready".into_response()
}

fn not_ready(message: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorBody::new("NOT_READY", message)),
    )
        .into_response()
}
