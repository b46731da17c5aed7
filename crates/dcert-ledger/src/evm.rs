//! # EVM JSON-RPC Ledger
//!
//! Production [`Ledger`] that talks to the registry contract on an
//! EVM-compatible chain over JSON-RPC.
//!
//! ## How It Works
//!
//! 1. On first use the client checks `eth_chainId` against configuration
//!    and confirms the contract address holds code. The result is cached
//!    for the life of the process; a failed attempt is not cached, so the
//!    next call tries again. There is no background reconnect.
//! 2. Reads go through `eth_call` against the `latest` block.
//! 3. Writes go through `eth_estimateGas` → `eth_gasPrice` → fee check →
//!    `eth_getTransactionCount` → local signature → `eth_sendRawTransaction`,
//!    then poll `eth_getTransactionReceipt` until the transaction is mined
//!    or the receipt wait runs out. Transport errors while polling are
//!    retried until the deadline, which then reports
//!    [`LedgerError::ReceiptTimeout`], never [`LedgerError::Unavailable`].
//!
//! ## Signing
//!
//! Writes are signed in-process by the configured [`TxSigner`] as EIP-155
//! transactions for the connected chain id. Nonce lookup and submission
//! are serialised per client so concurrent writes do not reuse a nonce.
//! Without a signer the client is read-only and writes fail with
//! [`LedgerError::Config`].
//!
//! ## Revert Detection
//!
//! Nodes report reverts in different shapes. In order of preference the
//! reason is taken from the ABI-encoded `Error(string)` in `error.data`,
//! then from an `execution reverted: …` message, then from a
//! `reverted with reason string '…'` message. JSON-RPC code `3` with no
//! decodable reason is still a revert.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dcert_core::Bytes32;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::abi;
use crate::config::{is_valid_eth_address, LedgerConfig};
use crate::error::LedgerError;
use crate::fee::{estimated_fee, parse_quantity, with_gas_margin, Wei};
use crate::signer::{parse_address, LegacyTx, TxSigner};
use crate::{LeafStatus, Ledger, LedgerOutcome};

/// JSON-RPC code some nodes use for execution reverts.
const REVERT_ERROR_CODE: i64 = 3;

#[derive(Debug, Clone, Copy)]
struct Connection {
    chain_id: u64,
}

/// Registry client over EVM JSON-RPC.
#[derive(Debug)]
pub struct EvmLedger {
    client: reqwest::Client,
    config: LedgerConfig,
    contract: [u8; 20],
    connection: OnceCell<Connection>,
    nonce_lock: tokio::sync::Mutex<()>,
    next_id: AtomicU64,
}

impl EvmLedger {
    /// Build the client. No network traffic happens until the first call.
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let contract = is_valid_eth_address(&config.contract_address)
            .then(|| parse_address(&config.contract_address))
            .flatten()
            .ok_or_else(|| {
                LedgerError::Config(format!(
                    "invalid contract address: {}",
                    config.contract_address
                ))
            })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            contract,
            connection: OnceCell::new(),
            nonce_lock: tokio::sync::Mutex::new(()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Chain id reported by the node, once connected.
    pub fn chain_id(&self) -> Option<u64> {
        self.connection.get().map(|c| c.chain_id)
    }

    /// Send a JSON-RPC request and return the result field.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self
            .client
            .post(self.config.rpc_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::Unavailable(format!("{method}: request timed out"))
                } else {
                    LedgerError::Unavailable(format!("{method}: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            return Err(LedgerError::Unavailable(format!(
                "{method}: HTTP {}",
                resp.status()
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(error) = json.get("error") {
            return Err(classify_rpc_error(error));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{method}: missing 'result'")))
    }

    async fn connect(&self) -> Result<Connection, LedgerError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                let raw = self.rpc_call("eth_chainId", json!([])).await?;
                let chain_id = quantity_u64(&raw, "eth_chainId")?;
                if let Some(expected) = self.config.chain_id {
                    if expected != chain_id {
                        return Err(LedgerError::Config(format!(
                            "node is on chain {chain_id}, expected {expected}"
                        )));
                    }
                }

                let code = self
                    .rpc_call(
                        "eth_getCode",
                        json!([self.config.contract_address, "latest"]),
                    )
                    .await?;
                let code = code.as_str().ok_or_else(|| {
                    LedgerError::InvalidResponse("eth_getCode: non-string result".into())
                })?;
                if code.len() <= 2 {
                    return Err(LedgerError::Config(format!(
                        "no contract code at {}",
                        self.config.contract_address
                    )));
                }

                tracing::info!(
                    chain_id,
                    contract = %self.config.contract_address,
                    sender = ?self.config.sender_address(),
                    "connected to ledger node"
                );
                Ok::<_, LedgerError>(Connection { chain_id })
            })
            .await?;
        Ok(*conn)
    }

    async fn submit(
        &self,
        function: &'static str,
        calldata: Vec<u8>,
        max_fee: Option<Wei>,
        already_applied: &str,
    ) -> Result<LedgerOutcome, LedgerError> {
        let signer = self.signer()?;
        let conn = self.connect().await?;
        let sender = signer.address();
        let data = abi::to_hex(&calldata);
        let call = json!({
            "from": sender,
            "to": self.config.contract_address,
            "data": data,
        });

        let estimate = match self.rpc_call("eth_estimateGas", json!([call])).await {
            Ok(v) => quantity_u64(&v, "eth_estimateGas")?,
            Err(LedgerError::Reverted { reason }) if reason == already_applied => {
                tracing::info!(function, %reason, "write already in effect on ledger");
                return Ok(LedgerOutcome::AlreadyApplied { reason });
            }
            Err(e) => return Err(e),
        };
        let gas = with_gas_margin(estimate);

        let raw_price = self.rpc_call("eth_gasPrice", json!([])).await?;
        let price = raw_price
            .as_str()
            .ok_or_else(|| LedgerError::InvalidResponse("eth_gasPrice: non-string result".into()))
            .and_then(|s| {
                Wei::from_quantity(s)
                    .map_err(|e| LedgerError::InvalidResponse(format!("eth_gasPrice: {e}")))
            })?;
        let fee = estimated_fee(gas, price)
            .ok_or_else(|| LedgerError::InvalidResponse("fee estimate overflows".into()))?;

        if let Some(max) = max_fee {
            if fee > max {
                tracing::warn!(function, %fee, %max, "estimated fee above cap, not submitting");
                return Err(LedgerError::FeeExceeded { estimated: fee, max });
            }
        }

        let tx_hash = {
            let _submitting = self.nonce_lock.lock().await;
            let raw_nonce = self
                .rpc_call("eth_getTransactionCount", json!([sender, "pending"]))
                .await?;
            let tx = LegacyTx {
                nonce: quantity_u64(&raw_nonce, "eth_getTransactionCount")?,
                gas_price: price,
                gas,
                to: self.contract,
                value: Wei(0),
                data: calldata,
            };
            let signed = signer
                .sign(&tx, conn.chain_id)
                .map_err(|e| LedgerError::Config(e.to_string()))?;
            let tx_hash = signed.hash.to_hex();

            match self
                .rpc_call("eth_sendRawTransaction", json!([abi::to_hex(&signed.raw)]))
                .await
            {
                Ok(v) => {
                    if v.as_str().is_some_and(|h| !h.eq_ignore_ascii_case(&tx_hash)) {
                        tracing::warn!(
                            function,
                            %tx_hash,
                            node_hash = %v,
                            "node reported a different transaction hash"
                        );
                    }
                }
                Err(LedgerError::Reverted { reason }) if reason == already_applied => {
                    tracing::info!(function, %reason, "write already in effect on ledger");
                    return Ok(LedgerOutcome::AlreadyApplied { reason });
                }
                Err(e) => return Err(e),
            }
            tx_hash
        };
        tracing::info!(function, %tx_hash, gas, %fee, "transaction submitted");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        match receipt.get("status").and_then(Value::as_str) {
            Some("0x1") => {
                tracing::info!(function, %tx_hash, "transaction mined");
                Ok(LedgerOutcome::Applied { tx_hash })
            }
            status => {
                tracing::error!(function, %tx_hash, ?status, "transaction mined with failure status");
                Err(LedgerError::TransactionFailed { tx_hash })
            }
        }
    }

    fn signer(&self) -> Result<&TxSigner, LedgerError> {
        self.config.signer.as_ref().ok_or_else(|| {
            LedgerError::Config("no signing key configured; ledger writes are disabled".into())
        })
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Value, LedgerError> {
        let poll = Duration::from_millis(self.config.receipt_poll_ms.max(1));
        let limit = Duration::from_secs(self.config.receipt_timeout_secs);
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            match self
                .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
                .await
            {
                Ok(receipt) if !receipt.is_null() => return Ok(receipt),
                Ok(_) => {}
                Err(LedgerError::Unavailable(e)) => {
                    tracing::warn!(%tx_hash, error = %e, "receipt poll failed; retrying");
                }
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() + poll > deadline {
                return Err(LedgerError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    waited_secs: limit.as_secs(),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn verify_leaf(
        &self,
        root: &Bytes32,
        proof: &[Bytes32],
        leaf: &Bytes32,
    ) -> Result<LeafStatus, LedgerError> {
        self.connect().await?;
        let call = json!({
            "to": self.config.contract_address,
            "data": abi::to_hex(&abi::encode_verify_leaf(root, proof, leaf)),
        });
        match self.rpc_call("eth_call", json!([call, "latest"])).await {
            Ok(v) => {
                let hex = v.as_str().ok_or_else(|| {
                    LedgerError::InvalidResponse("eth_call: non-string result".into())
                })?;
                let bytes = abi::from_hex(hex)
                    .map_err(|e| LedgerError::InvalidResponse(format!("eth_call: {e}")))?;
                let included = abi::decode_bool(&bytes)
                    .map_err(|e| LedgerError::InvalidResponse(format!("verifyLeaf: {e}")))?;
                Ok(if included {
                    LeafStatus::Included
                } else {
                    LeafStatus::NotIncluded
                })
            }
            Err(LedgerError::Reverted { reason })
                if reason == self.config.revert_reasons.leaf_revoked =>
            {
                Ok(LeafStatus::Revoked)
            }
            Err(e) => Err(e),
        }
    }

    async fn add_root(
        &self,
        root: &Bytes32,
        max_fee: Option<Wei>,
    ) -> Result<LedgerOutcome, LedgerError> {
        self.submit(
            "addRoot",
            abi::encode_add_root(root),
            max_fee,
            &self.config.revert_reasons.root_exists,
        )
        .await
    }

    async fn revoke_leaf(
        &self,
        leaf: &Bytes32,
        max_fee: Option<Wei>,
    ) -> Result<LedgerOutcome, LedgerError> {
        self.submit(
            "revokeLeaf",
            abi::encode_revoke_leaf(leaf),
            max_fee,
            &self.config.revert_reasons.leaf_revoked,
        )
        .await
    }

    async fn ready(&self) -> Result<(), LedgerError> {
        self.connect().await.map(|_| ())
    }

    fn name(&self) -> &str {
        "evm"
    }
}

fn quantity_u64(v: &Value, method: &str) -> Result<u64, LedgerError> {
    let s = v
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("{method}: non-string quantity")))?;
    let n = parse_quantity(s).map_err(|e| LedgerError::InvalidResponse(format!("{method}: {e}")))?;
    u64::try_from(n).map_err(|_| LedgerError::InvalidResponse(format!("{method}: {s} too large")))
}

/// Map a JSON-RPC `error` object to a [`LedgerError`].
fn classify_rpc_error(error: &Value) -> LedgerError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown RPC error")
        .to_string();

    let data = error.get("data").and_then(|d| {
        d.as_str()
            .or_else(|| d.get("data").and_then(Value::as_str))
    });
    if let Some(reason) = data
        .and_then(|hex| abi::from_hex(hex).ok())
        .and_then(|bytes| abi::decode_revert_reason(&bytes))
    {
        return LedgerError::Reverted { reason };
    }

    if let Some(rest) = message.strip_prefix("execution reverted") {
        let reason = rest.trim_start_matches(':').trim();
        return LedgerError::Reverted {
            reason: if reason.is_empty() {
                message.clone()
            } else {
                reason.to_string()
            },
        };
    }

    const HARDHAT_MARKER: &str = "reverted with reason string '";
    if let Some(start) = message.find(HARDHAT_MARKER) {
        let tail = &message[start + HARDHAT_MARKER.len()..];
        if let Some(end) = tail.rfind('\'') {
            return LedgerError::Reverted {
                reason: tail[..end].to_string(),
            };
        }
    }

    if code == REVERT_ERROR_CODE {
        return LedgerError::Reverted { reason: message };
    }

    LedgerError::Rejected { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LEAF_REVOKED_REASON;

    fn config() -> LedgerConfig {
        LedgerConfig::new(
            url::Url::parse("http://127.0.0.1:8545").unwrap(),
            "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
        )
    }

    #[test]
    fn rejects_bad_contract_address() {
        let mut cfg = config();
        cfg.contract_address = "0x123".into();
        assert!(matches!(EvmLedger::new(cfg), Err(LedgerError::Config(_))));
    }

    #[tokio::test]
    async fn writes_without_signer_fail_before_any_request() {
        let ledger = EvmLedger::new(config()).unwrap();
        let err = ledger.add_root(&Bytes32::ZERO, None).await.unwrap_err();
        assert!(matches!(err, LedgerError::Config(msg) if msg.contains("signing key")));
        assert_eq!(ledger.chain_id(), None);
    }

    #[test]
    fn not_connected_until_first_call() {
        let ledger = EvmLedger::new(config()).unwrap();
        assert_eq!(ledger.chain_id(), None);
        assert_eq!(ledger.name(), "evm");
    }

    #[test]
    fn revert_from_abi_data() {
        let data = abi::to_hex(&abi::encode_revert_reason(LEAF_REVOKED_REASON));
        let err = classify_rpc_error(&json!({
            "code": 3,
            "message": "execution reverted",
            "data": data,
        }));
        assert_eq!(
            err,
            LedgerError::Reverted {
                reason: LEAF_REVOKED_REASON.into()
            }
        );
    }

    #[test]
    fn revert_from_nested_data() {
        let data = abi::to_hex(&abi::encode_revert_reason("nope"));
        let err = classify_rpc_error(&json!({
            "code": -32603,
            "message": "Internal error",
            "data": { "message": "revert", "data": data },
        }));
        assert_eq!(err, LedgerError::Reverted { reason: "nope".into() });
    }

    #[test]
    fn revert_from_message() {
        let err = classify_rpc_error(&json!({
            "code": -32000,
            "message": "execution reverted: This root already exists.",
        }));
        assert_eq!(
            err,
            LedgerError::Reverted {
                reason: "This root already exists.".into()
            }
        );
    }

    #[test]
    fn revert_from_hardhat_message() {
        let err = classify_rpc_error(&json!({
            "code": -32603,
            "message": "VM Exception while processing transaction: reverted with reason string 'This certificate has been revoked.'",
        }));
        assert_eq!(
            err,
            LedgerError::Reverted {
                reason: LEAF_REVOKED_REASON.into()
            }
        );
    }

    #[test]
    fn non_revert_is_rejection() {
        let err = classify_rpc_error(&json!({
            "code": -32000,
            "message": "insufficient funds for gas * price + value",
        }));
        assert!(matches!(err, LedgerError::Rejected { code: -32000, .. }));
    }
}
