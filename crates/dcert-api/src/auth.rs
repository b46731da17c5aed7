//! # Caller Authentication
//!
//! Identity is established upstream. The authentication collaborator
//! forwards it in the bearer token together with a shared secret:
//!
//! ```text
//! Bearer {role}:{userId}:{instituteId}:{secret}
//! ```
//!
//! `instituteId` may be empty. The secret is compared in constant time;
//! on success a [`CallerIdentity`] is injected into the request extensions
//! and handlers receive it through the [`Caller`] extractor.
//!
//! The caller's verified e-mail address travels in the `X-Caller-Email`
//! header. It is read only once the token has been accepted.
//!
//! When no secret is configured every request runs as an administrator.
//! That mode exists for local development only.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dcert_issuance::{CallerIdentity, Role};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody};

// ── Caller extractor ────────────────────────────────────────────────────────

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub CallerIdentity);

/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .map(Caller)
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Identity used when authentication is disabled.
pub fn development_identity() -> CallerIdentity {
    CallerIdentity {
        user_id: Uuid::nil(),
        role: Role::Admin,
        institute_id: None,
        email: None,
    }
}

/// Header carrying the caller's e-mail address.
pub const CALLER_EMAIL_HEADER: &str = "x-caller-email";

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of shared secrets.
///
/// When lengths differ a dummy comparison still runs so the timing does
/// not reveal the expected length.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token of the form `{role}:{userId}:{instituteId}:{secret}`.
///
/// The secret is checked before anything else is interpreted, so a caller
/// without the secret learns nothing about the accepted format.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(4, ':').collect();
    let [role, user, institute, secret] = parts.as_slice() else {
        return Err(
            "invalid token format, expected {role}:{userId}:{instituteId}:{secret}".into(),
        );
    };

    if !constant_time_token_eq(secret, expected_secret) {
        return Err("invalid bearer token".into());
    }

    let role: Role = role.parse().map_err(|_| format!("unknown role: {role}"))?;
    let user_id = user
        .parse::<Uuid>()
        .map_err(|e| format!("invalid userId: {e}"))?;
    let institute_id = if institute.is_empty() {
        None
    } else {
        Some(
            institute
                .parse::<Uuid>()
                .map_err(|e| format!("invalid instituteId: {e}"))?,
        )
    };

    Ok(CallerIdentity {
        user_id,
        role,
        institute_id,
        email: None,
    })
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the caller's identity.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let Some(expected) = expected else {
        request.extensions_mut().insert(development_identity());
        return next.run(request).await;
    };

    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) => match value.strip_prefix("Bearer ") {
            Some(provided) => match parse_bearer_token(provided, &expected) {
                Ok(mut identity) => {
                    identity.email = request
                        .headers()
                        .get(CALLER_EMAIL_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_owned);
                    request.extensions_mut().insert(identity);
                    next.run(request).await
                }
                Err(msg) => {
                    tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                    unauthorized_response(&msg)
                }
            },
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                unauthorized_response("authorization header must use Bearer scheme")
            }
        },
        None => {
            tracing::warn!("authentication failed: missing authorization header");
            unauthorized_response("missing authorization header")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("UNAUTHORIZED", message)),
    )
        .into_response()
}
