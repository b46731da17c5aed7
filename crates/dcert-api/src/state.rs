//! # Application State
//!
//! Shared state for the Axum application: the issuance service (which owns
//! the store and the ledger handles) and the process configuration.

use std::time::Duration;

use dcert_issuance::IssuanceService;
use thiserror::Error;

/// Default bound on a whole commit or revoke call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 180;

/// Application configuration, read once at startup.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared secret expected in the bearer token.
    /// If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    /// Upper bound on a single orchestrator call.
    pub request_timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Invalid server configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl AppConfig {
    /// Read `PORT`, `AUTH_TOKEN` and `REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let port = match lookup("PORT") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                var: "PORT",
                expected: "a port number",
                value: v,
            })?,
            None => defaults.port,
        };
        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(v) => match v.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "REQUEST_TIMEOUT_SECS",
                        expected: "a positive number of seconds",
                        value: v,
                    })
                }
            },
            None => defaults.request_timeout,
        };
        let auth_token = lookup("AUTH_TOKEN").filter(|t| !t.is_empty());
        Ok(Self {
            port,
            auth_token,
            request_timeout,
        })
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub service: IssuanceService,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(service: IssuanceService, config: AppConfig) -> Self {
        Self { service, config }
    }
}
