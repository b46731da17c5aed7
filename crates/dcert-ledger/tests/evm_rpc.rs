//! # EVM Ledger Against a Scripted JSON-RPC Node
//!
//! Exercises [`EvmLedger`] request construction, local signing, revert
//! classification, the fee guard and receipt handling against a wiremock
//! server standing in for the node.

use dcert_core::Bytes32;
use dcert_ledger::abi;
use dcert_ledger::config::{LEAF_REVOKED_REASON, ROOT_EXISTS_REASON};
use dcert_ledger::signer::{parse_address, LegacyTx};
use dcert_ledger::{
    EvmLedger, LeafStatus, Ledger, LedgerConfig, LedgerError, LedgerOutcome, TxSigner, Wei,
};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CONTRACT: &str = "0xdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
const SIGNER_KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";
/// Address of `SIGNER_KEY`.
const SENDER: &str = "0x9d8a62f656a8d1615c1294fd71e9cfb3e4855a4f";

fn signer() -> TxSigner {
    TxSigner::from_hex(SIGNER_KEY).unwrap()
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

fn rpc_error(code: i64, message: &str, data: Option<String>) -> ResponseTemplate {
    let mut error = json!({"code": code, "message": message});
    if let Some(d) = data {
        error["data"] = json!(d);
    }
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "error": error}))
}

async fn on(server: &MockServer, rpc_method: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(response)
        .mount(server)
        .await;
}

/// A node on chain 1337 with code at the contract address.
async fn node() -> MockServer {
    let server = MockServer::start().await;
    on(&server, "eth_chainId", ok(json!("0x539"))).await;
    on(&server, "eth_getCode", ok(json!("0x6080604052"))).await;
    server
}

fn ledger(server: &MockServer) -> EvmLedger {
    let config = LedgerConfig::new(server.uri().parse().unwrap(), CONTRACT)
        .with_signer(signer())
        .with_chain_id(1337)
        .with_receipt_wait(10, 2);
    EvmLedger::new(config).unwrap()
}

/// Estimate 50_000 gas at 1 gwei: 55_000 gas after margin, 0.000055 ether.
/// The sender's next nonce is 5.
async fn price_and_estimate(server: &MockServer) {
    on(server, "eth_estimateGas", ok(json!("0xc350"))).await;
    on(server, "eth_gasPrice", ok(json!("0x3b9aca00"))).await;
    on(server, "eth_getTransactionCount", ok(json!("0x5"))).await;
}

/// The raw transaction the client is expected to submit for `calldata`.
fn expected_signed(calldata: Vec<u8>) -> (String, String) {
    let tx = LegacyTx {
        nonce: 5,
        gas_price: Wei(1_000_000_000),
        gas: 55_000,
        to: parse_address(CONTRACT).unwrap(),
        value: Wei(0),
        data: calldata,
    };
    let signed = signer().sign(&tx, 1337).unwrap();
    (abi::to_hex(&signed.raw), signed.hash.to_hex())
}

fn word(b: u8) -> Bytes32 {
    Bytes32::new([b; 32])
}

fn bool_word(v: bool) -> String {
    let mut w = [0u8; 32];
    w[31] = u8::from(v);
    abi::to_hex(&w)
}

// -- Connection ----------------------------------------------------------

#[tokio::test]
async fn connect_checks_chain_id() {
    let server = MockServer::start().await;
    on(&server, "eth_chainId", ok(json!("0x1"))).await;
    let err = ledger(&server).ready().await.unwrap_err();
    assert!(matches!(err, LedgerError::Config(msg) if msg.contains("1337")));
}

#[tokio::test]
async fn connect_requires_contract_code() {
    let server = MockServer::start().await;
    on(&server, "eth_chainId", ok(json!("0x539"))).await;
    on(&server, "eth_getCode", ok(json!("0x"))).await;
    let err = ledger(&server).ready().await.unwrap_err();
    assert!(matches!(err, LedgerError::Config(msg) if msg.contains("no contract code")));
}

#[tokio::test]
async fn connection_is_established_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_chainId"})))
        .respond_with(ok(json!("0x539")))
        .expect(1)
        .mount(&server)
        .await;
    on(&server, "eth_getCode", ok(json!("0x60"))).await;
    on(&server, "eth_call", ok(json!(bool_word(true)))).await;

    let l = ledger(&server);
    for _ in 0..3 {
        l.verify_leaf(&word(1), &[], &word(2)).await.unwrap();
    }
    assert_eq!(l.chain_id(), Some(1337));
}

#[tokio::test]
async fn http_failure_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let err = ledger(&server).ready().await.unwrap_err();
    assert!(matches!(err, LedgerError::Unavailable(_)));
}

// -- Reads ---------------------------------------------------------------

#[tokio::test]
async fn verify_leaf_included_and_not_included() {
    let server = node().await;
    let root = word(1);
    let leaf = word(2);
    let proof = [word(3)];
    let expected = abi::to_hex(&abi::encode_verify_leaf(&root, &proof, &leaf));
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_call",
            "params": [{"to": CONTRACT, "data": expected}, "latest"]
        })))
        .respond_with(ok(json!(bool_word(true))))
        .expect(1)
        .mount(&server)
        .await;
    on(&server, "eth_call", ok(json!(bool_word(false)))).await;

    let l = ledger(&server);
    assert_eq!(
        l.verify_leaf(&root, &proof, &leaf).await.unwrap(),
        LeafStatus::Included
    );
    assert_eq!(
        l.verify_leaf(&root, &[], &leaf).await.unwrap(),
        LeafStatus::NotIncluded
    );
}

#[tokio::test]
async fn verify_leaf_revert_reason_maps_to_revoked() {
    let server = node().await;
    let data = abi::to_hex(&abi::encode_revert_reason(LEAF_REVOKED_REASON));
    on(&server, "eth_call", rpc_error(3, "execution reverted", Some(data))).await;
    assert_eq!(
        ledger(&server)
            .verify_leaf(&word(1), &[], &word(2))
            .await
            .unwrap(),
        LeafStatus::Revoked
    );
}

#[tokio::test]
async fn verify_leaf_other_revert_stays_an_error() {
    let server = node().await;
    on(
        &server,
        "eth_call",
        rpc_error(-32000, "execution reverted: Root not found.", None),
    )
    .await;
    let err = ledger(&server)
        .verify_leaf(&word(1), &[], &word(2))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::Reverted {
            reason: "Root not found.".into()
        }
    );
}

// -- Writes --------------------------------------------------------------

#[tokio::test]
async fn add_root_signs_locally_and_waits_for_receipt() {
    let server = node().await;
    on(&server, "eth_gasPrice", ok(json!("0x3b9aca00"))).await;
    let calldata = abi::encode_add_root(&word(7));
    let (raw, tx_hash) = expected_signed(calldata.clone());

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_estimateGas",
            "params": [{"from": SENDER, "to": CONTRACT, "data": abi::to_hex(&calldata)}]
        })))
        .respond_with(ok(json!("0xc350")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getTransactionCount",
            "params": [SENDER, "pending"]
        })))
        .respond_with(ok(json!("0x5")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_sendRawTransaction",
            "params": [raw]
        })))
        .respond_with(ok(json!(tx_hash)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_sendTransaction"})))
        .respond_with(ok(json!(tx_hash)))
        .expect(0)
        .mount(&server)
        .await;
    // pending once, then mined
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ok(Value::Null))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    on(
        &server,
        "eth_getTransactionReceipt",
        ok(json!({"status": "0x1", "transactionHash": tx_hash})),
    )
    .await;

    let out = ledger(&server)
        .add_root(&word(7), Some(Wei::parse_ether("0.001").unwrap()))
        .await
        .unwrap();
    assert_eq!(out, LedgerOutcome::Applied { tx_hash });
}

#[tokio::test]
async fn receipt_poll_survives_transient_node_errors() {
    let server = node().await;
    price_and_estimate(&server).await;
    let (_, tx_hash) = expected_signed(abi::encode_revoke_leaf(&word(9)));
    on(&server, "eth_sendRawTransaction", ok(json!(tx_hash))).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    on(
        &server,
        "eth_getTransactionReceipt",
        ok(json!({"status": "0x1", "transactionHash": tx_hash})),
    )
    .await;

    let out = ledger(&server).revoke_leaf(&word(9), None).await.unwrap();
    assert_eq!(out, LedgerOutcome::Applied { tx_hash });
}

#[tokio::test]
async fn unreachable_receipt_is_a_timeout_not_an_outage() {
    let server = node().await;
    price_and_estimate(&server).await;
    let (_, tx_hash) = expected_signed(abi::encode_add_root(&word(7)));
    on(&server, "eth_sendRawTransaction", ok(json!(tx_hash))).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_getTransactionReceipt"})))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = LedgerConfig::new(server.uri().parse().unwrap(), CONTRACT)
        .with_signer(signer())
        .with_receipt_wait(20, 0);
    let err = EvmLedger::new(config)
        .unwrap()
        .add_root(&word(7), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::ReceiptTimeout {
            tx_hash,
            waited_secs: 0
        }
    );
}

#[tokio::test]
async fn read_only_client_refuses_writes() {
    let server = node().await;
    price_and_estimate(&server).await;
    let config = LedgerConfig::new(server.uri().parse().unwrap(), CONTRACT);
    let err = EvmLedger::new(config)
        .unwrap()
        .add_root(&word(7), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Config(_)));
}

#[tokio::test]
async fn fee_above_cap_is_never_submitted() {
    let server = node().await;
    price_and_estimate(&server).await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
        .respond_with(ok(json!("0x00")))
        .expect(0)
        .mount(&server)
        .await;

    let cap = Wei::parse_ether("0.00001").unwrap();
    let err = ledger(&server).add_root(&word(7), Some(cap)).await.unwrap_err();
    assert_eq!(
        err,
        LedgerError::FeeExceeded {
            estimated: Wei(55_000_000_000_000),
            max: cap
        }
    );
}

#[tokio::test]
async fn existing_root_is_already_applied() {
    let server = node().await;
    on(
        &server,
        "eth_estimateGas",
        rpc_error(
            3,
            "execution reverted",
            Some(abi::to_hex(&abi::encode_revert_reason(ROOT_EXISTS_REASON))),
        ),
    )
    .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"method": "eth_sendRawTransaction"})))
        .respond_with(ok(json!("0x00")))
        .expect(0)
        .mount(&server)
        .await;

    let out = ledger(&server).add_root(&word(7), None).await.unwrap();
    assert_eq!(
        out,
        LedgerOutcome::AlreadyApplied {
            reason: ROOT_EXISTS_REASON.into()
        }
    );
}

#[tokio::test]
async fn revoke_of_revoked_leaf_is_already_applied() {
    let server = node().await;
    on(
        &server,
        "eth_estimateGas",
        rpc_error(-32000, &format!("execution reverted: {LEAF_REVOKED_REASON}"), None),
    )
    .await;
    let out = ledger(&server).revoke_leaf(&word(7), None).await.unwrap();
    assert!(matches!(out, LedgerOutcome::AlreadyApplied { .. }));
}

#[tokio::test]
async fn mined_failure_status_is_transaction_failed() {
    let server = node().await;
    price_and_estimate(&server).await;
    let (_, tx_hash) = expected_signed(abi::encode_revoke_leaf(&word(7)));
    on(&server, "eth_sendRawTransaction", ok(json!(tx_hash))).await;
    on(
        &server,
        "eth_getTransactionReceipt",
        ok(json!({"status": "0x0", "transactionHash": tx_hash})),
    )
    .await;

    let err = ledger(&server).revoke_leaf(&word(7), None).await.unwrap_err();
    assert_eq!(err, LedgerError::TransactionFailed { tx_hash });
}

#[tokio::test]
async fn receipt_wait_times_out() {
    let server = node().await;
    price_and_estimate(&server).await;
    on(&server, "eth_sendRawTransaction", ok(json!("0x00"))).await;
    on(&server, "eth_getTransactionReceipt", ok(Value::Null)).await;

    let config = LedgerConfig::new(server.uri().parse().unwrap(), CONTRACT)
        .with_signer(signer())
        .with_receipt_wait(20, 0);
    let err = EvmLedger::new(config)
        .unwrap()
        .add_root(&word(7), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::ReceiptTimeout { .. }));
}

#[tokio::test]
async fn node_rejection_is_not_a_revert() {
    let server = node().await;
    price_and_estimate(&server).await;
    on(
        &server,
        "eth_sendRawTransaction",
        rpc_error(-32000, "insufficient funds for gas * price + value", None),
    )
    .await;
    let err = ledger(&server).add_root(&word(7), None).await.unwrap_err();
    assert!(matches!(err, LedgerError::Rejected { code: -32000, .. }));
}
