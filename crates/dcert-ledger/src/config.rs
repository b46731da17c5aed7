//! Ledger client configuration.
//!
//! Read once at process start. The RPC URL may embed a provider API key in
//! its path or query, so the custom `Debug` impl prints only its origin.
//! The signing key is never printed; only its address is.

use url::Url;
use zeroize::Zeroizing;

use crate::signer::{SignerError, TxSigner};

/// Revert reason of `revokeLeaf` on an already-revoked leaf.
pub const LEAF_REVOKED_REASON: &str = "This certificate has been revoked.";
/// Revert reason of `addRoot` on an already-anchored root.
pub const ROOT_EXISTS_REASON: &str = "This root already exists.";

/// Revert reasons that mean "already applied" rather than "failed".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertReasons {
    pub leaf_revoked: String,
    pub root_exists: String,
}

impl Default for RevertReasons {
    fn default() -> Self {
        Self {
            leaf_revoked: LEAF_REVOKED_REASON.to_string(),
            root_exists: ROOT_EXISTS_REASON.to_string(),
        }
    }
}

/// Configuration for [`EvmLedger`](crate::EvmLedger).
#[derive(Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    /// Registry contract (0x + 40 hex chars).
    pub contract_address: String,
    /// Key that signs registry writes. Reads work without one.
    pub signer: Option<TxSigner>,
    /// Expected chain id; checked on connect when set.
    pub chain_id: Option<u64>,
    /// Per-request timeout in seconds (default: 30).
    pub timeout_secs: u64,
    /// Interval between receipt polls in milliseconds (default: 2000).
    pub receipt_poll_ms: u64,
    /// Give up waiting for a receipt after this many seconds (default: 300).
    pub receipt_timeout_secs: u64,
    pub revert_reasons: RevertReasons,
}

impl std::fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("rpc_url", &self.rpc_url.origin().ascii_serialization())
            .field("contract_address", &self.contract_address)
            .field("sender", &self.sender_address())
            .field("chain_id", &self.chain_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("receipt_poll_ms", &self.receipt_poll_ms)
            .field("receipt_timeout_secs", &self.receipt_timeout_secs)
            .finish()
    }
}

impl LedgerConfig {
    /// Create a read-only configuration with default timeouts.
    pub fn new(rpc_url: Url, contract_address: impl Into<String>) -> Self {
        Self {
            rpc_url,
            contract_address: contract_address.into(),
            signer: None,
            chain_id: None,
            timeout_secs: 30,
            receipt_poll_ms: 2_000,
            receipt_timeout_secs: 300,
            revert_reasons: RevertReasons::default(),
        }
    }

    pub fn with_signer(mut self, signer: TxSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Address derived from the signing key, when one is configured.
    pub fn sender_address(&self) -> Option<String> {
        self.signer.as_ref().map(TxSigner::address)
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Set the receipt polling interval and overall wait.
    pub fn with_receipt_wait(mut self, poll_ms: u64, timeout_secs: u64) -> Self {
        self.receipt_poll_ms = poll_ms;
        self.receipt_timeout_secs = timeout_secs;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Returns `Ok(None)` when `LEDGER_RPC_URL` is unset.
    ///
    /// Variables:
    /// - `LEDGER_RPC_URL`
    /// - `LEDGER_CONTRACT_ADDRESS` (required with an RPC URL)
    /// - `LEDGER_SIGNER_KEY` (hex secp256k1 key; without it writes are refused)
    /// - `LEDGER_CHAIN_ID` (optional)
    /// - `LEDGER_TIMEOUT_SECS` (default: 30)
    /// - `LEDGER_RECEIPT_POLL_MS` (default: 2000)
    /// - `LEDGER_RECEIPT_TIMEOUT_SECS` (default: 300)
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(raw_url) = std::env::var("LEDGER_RPC_URL") else {
            return Ok(None);
        };
        let rpc_url = Url::parse(&raw_url)
            .map_err(|e| ConfigError::InvalidUrl("LEDGER_RPC_URL".into(), e.to_string()))?;
        let contract_address = env_address("LEDGER_CONTRACT_ADDRESS")?;

        let mut config = Self::new(rpc_url, contract_address);
        if let Ok(secret) = std::env::var("LEDGER_SIGNER_KEY") {
            let secret = Zeroizing::new(secret);
            let signer = TxSigner::from_hex(&secret)
                .map_err(|e| ConfigError::InvalidKey("LEDGER_SIGNER_KEY", e))?;
            config.signer = Some(signer);
        }
        config.chain_id = env_number("LEDGER_CHAIN_ID")?;
        if let Some(v) = env_number("LEDGER_TIMEOUT_SECS")? {
            config.timeout_secs = v;
        }
        if let Some(v) = env_number("LEDGER_RECEIPT_POLL_MS")? {
            config.receipt_poll_ms = v;
        }
        if let Some(v) = env_number("LEDGER_RECEIPT_TIMEOUT_SECS")? {
            config.receipt_timeout_secs = v;
        }
        Ok(Some(config))
    }
}

fn env_address(var: &'static str) -> Result<String, ConfigError> {
    let value = std::env::var(var).map_err(|_| ConfigError::Missing(var))?;
    if !is_valid_eth_address(&value) {
        return Err(ConfigError::InvalidAddress(var, value));
    }
    Ok(value)
}

fn env_number(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber(var, raw)),
        Err(_) => Ok(None),
    }
}

/// Validate that a string is a well-formed address (0x + 40 hex chars).
pub fn is_valid_eth_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required when LEDGER_RPC_URL is set")]
    Missing(&'static str),
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    #[error("{0} is not a 0x-prefixed 20-byte address: {1}")]
    InvalidAddress(&'static str, String),
    #[error("{0} must be a non-negative integer, got {1:?}")]
    InvalidNumber(&'static str, String),
    #[error("{0}: {1}")]
    InvalidKey(&'static str, SignerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation() {
        assert!(is_valid_eth_address("0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef"));
        assert!(is_valid_eth_address("0xAbCdEf0123456789AbCdEf0123456789AbCdEf01"));
        assert!(!is_valid_eth_address("0x123"));
        assert!(!is_valid_eth_address("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef00"));
        assert!(!is_valid_eth_address("0xGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGGG"));
    }

    #[test]
    fn debug_hides_rpc_path() {
        let url = Url::parse("https://mainnet.example.io/v3/secret-project-key").unwrap();
        let key = "0x4646464646464646464646464646464646464646464646464646464646464646";
        let cfg = LedgerConfig::new(url, "0x0000000000000000000000000000000000000001")
            .with_signer(TxSigner::from_hex(key).unwrap());
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("secret-project-key"));
        assert!(!dbg.contains(&key[2..]));
        assert!(dbg.contains("mainnet.example.io"));
        assert!(dbg.contains("0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f"));
    }

    #[test]
    fn defaults() {
        let cfg = LedgerConfig::new(
            Url::parse("http://127.0.0.1:8545").unwrap(),
            "0x0000000000000000000000000000000000000001",
        );
        assert_eq!(cfg.sender_address(), None);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.receipt_poll_ms, 2_000);
        assert_eq!(cfg.receipt_timeout_secs, 300);
        assert_eq!(cfg.revert_reasons.leaf_revoked, LEAF_REVOKED_REASON);
    }

    #[test]
    fn env_number_rejects_garbage() {
        std::env::set_var("DCERT_TEST_LEDGER_NUM", "ten");
        let result = env_number("DCERT_TEST_LEDGER_NUM");
        std::env::remove_var("DCERT_TEST_LEDGER_NUM");
        assert!(matches!(result, Err(ConfigError::InvalidNumber(_, _))));
        assert_eq!(env_number("DCERT_TEST_LEDGER_UNSET_NUM").unwrap(), None);
    }
}
