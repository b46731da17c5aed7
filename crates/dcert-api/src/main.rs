//! # dcert-api — Binary Entry Point
//!
//! Starts the Axum HTTP server. Binds to a configurable port (default 8080).

use std::sync::Arc;

use dcert_api::state::{AppConfig, AppState};
use dcert_issuance::IssuanceService;
use dcert_ledger::{EvmLedger, Ledger, LedgerConfig, MockLedger};
use dcert_store::{DocumentStore, MemoryStore, PgStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::from_env().map_err(|e| {
        tracing::error!("Invalid server configuration: {e}");
        e
    })?;
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, authentication is disabled and every caller is an admin");
    }

    // Document store: PostgreSQL when DATABASE_URL is set, in-memory otherwise.
    let store: Arc<dyn DocumentStore> = match dcert_store::init_pool().await.map_err(|e| {
        tracing::error!("Database initialization failed: {e}");
        e
    })? {
        Some(pool) => Arc::new(PgStore::new(pool)),
        None => Arc::new(MemoryStore::new()),
    };

    // Ledger: JSON-RPC node when LEDGER_RPC_URL is set, in-process mock otherwise.
    let ledger: Arc<dyn Ledger> = match LedgerConfig::from_env().map_err(|e| {
        tracing::error!("Invalid ledger configuration: {e}");
        e
    })? {
        Some(ledger_config) => {
            tracing::info!(?ledger_config, "Ledger client configured");
            if ledger_config.signer.is_none() {
                tracing::warn!("LEDGER_SIGNER_KEY not set, commits and revocations will be refused");
            }
            Arc::new(EvmLedger::new(ledger_config)?)
        }
        None => {
            tracing::warn!(
                "LEDGER_RPC_URL not set, using the in-process mock ledger. \
                 Roots and revocations are not anchored anywhere."
            );
            Arc::new(MockLedger::new())
        }
    };

    let port = config.port;
    let state = AppState::new(IssuanceService::new(store, ledger), config);
    let app = dcert_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("dcert API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `RUST_LOG` selects the filter (default `info`); `LOG_FORMAT=json`
/// switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
