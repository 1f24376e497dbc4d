//! Shared test helpers for safe-quorum integration tests
//!
//! Constants, deterministic signers and JSON builders for relay and node mocks.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use safe_quorum::crypto::{LocalSigner, SignerProvider};
use safe_quorum::relay_client::RelayClient;
use safe_quorum::transaction::{FeeParams, Operation, TransactionRecord};
use safe_quorum::validation::{to_checksum_address, validate_address};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dummy Safe address (all-lowercase form is accepted without checksum)
pub const DUMMY_SAFE_ADDR: &str = "0x00000000000000000000000000000000000000a1";

/// Dummy call target
pub const DUMMY_TARGET_ADDR: &str = "0x00000000000000000000000000000000000000b2";

/// Recipient used when a test tampers with a bundle
pub const DUMMY_ATTACKER_ADDR: &str = "0x00000000000000000000000000000000000000e4";

/// Sepolia
pub const TEST_CHAIN_ID: u64 = 11155111;

/// Transaction hash returned by the mocked node for eth_sendRawTransaction
pub const DUMMY_EXEC_TX_HASH: &str = "0xabababababababababababababababababababababababababababababababab";

/// Fixed submission date for confirmation fixtures
pub const DUMMY_SUBMISSION_DATE: &str = "2024-01-01T00:00:00Z";

// ============================================================================
// SIGNERS AND ADDRESSES
// ============================================================================

/// Deterministic signer whose secret key is the integer `n`.
pub fn owner_signer(n: u8) -> LocalSigner {
    let mut secret = [0u8; 32];
    secret[31] = n;
    LocalSigner::from_bytes(&secret).unwrap()
}

pub fn shared_signer(n: u8) -> Arc<dyn SignerProvider> {
    Arc::new(owner_signer(n))
}

pub fn address(value: &str) -> Address {
    validate_address(value, "test").unwrap()
}

pub fn safe_address() -> Address {
    address(DUMMY_SAFE_ADDR)
}

pub fn checksum(address: &Address) -> String {
    to_checksum_address(address)
}

pub fn hash_hex(hash: &H256) -> String {
    format!("{:#x}", hash)
}

// ============================================================================
// RECORDS
// ============================================================================

/// ERC-20 style transfer record to the dummy target at `nonce`.
pub fn transfer_record(nonce: u64) -> TransactionRecord {
    TransactionRecord {
        to: address(DUMMY_TARGET_ADDR),
        value: U256::from(1_000_000_000_000_000u64),
        data: vec![0xa9, 0x05, 0x9c, 0xbb, 0x01, 0x02],
        operation: Operation::Call,
        fees: FeeParams::default(),
        nonce: U256::from(nonce),
    }
}

// ============================================================================
// RELAY FIXTURES
// ============================================================================

pub fn relay_client(server: &MockServer) -> Arc<RelayClient> {
    Arc::new(RelayClient::new(server.uri(), None, Duration::from_secs(5)).unwrap())
}

/// `GET /v1/safes/{address}/` response body (nonce as a string, threshold as a number).
pub fn safe_info_json(owners: &[Address], threshold: u64, nonce: u64) -> Value {
    json!({
        "address": checksum(&safe_address()),
        "nonce": nonce.to_string(),
        "threshold": threshold,
        "owners": owners.iter().map(checksum).collect::<Vec<_>>(),
        "masterCopy": "0xd9Db270c1B5E3Bd161E8c8503c55cEABeE709552",
        "modules": [],
        "fallbackHandler": "0xf48f2B2d2a534e402487b3ee7C18c33Aec0Fe5e4",
        "guard": "0x0000000000000000000000000000000000000000",
        "version": "1.3.0"
    })
}

/// Confirmation entry signed by `signer` over `hash`.
pub fn confirmation_json(signer: &LocalSigner, hash: &H256) -> Value {
    let signature = signer.sign_digest(hash).unwrap();
    json!({
        "owner": checksum(&signer.address()),
        "submissionDate": DUMMY_SUBMISSION_DATE,
        "transactionHash": null,
        "signature": signature.to_safe_hex(),
        "signatureType": "EOA"
    })
}

/// `GET /v1/multisig-transactions/{hash}/` response body for `record`.
pub fn bundle_json(record: &TransactionRecord, hash: &H256, confirmations: Vec<Value>, executed: bool) -> Value {
    json!({
        "safe": checksum(&safe_address()),
        "to": checksum(&record.to),
        "value": record.value.to_string(),
        "data": if record.data.is_empty() { Value::Null } else { json!(format!("0x{}", hex::encode(&record.data))) },
        "operation": record.operation.code(),
        "gasToken": checksum(&record.fees.gas_token),
        "safeTxGas": 0,
        "baseGas": "0",
        "gasPrice": "0",
        "refundReceiver": checksum(&record.fees.refund_receiver),
        "nonce": record.nonce.low_u64(),
        "safeTxHash": hash_hex(hash),
        "isExecuted": executed,
        "isSuccessful": if executed { json!(true) } else { Value::Null },
        "transactionHash": if executed { json!(DUMMY_EXEC_TX_HASH) } else { Value::Null },
        "submissionDate": DUMMY_SUBMISSION_DATE,
        "confirmationsRequired": 2,
        "confirmations": confirmations
    })
}

pub async fn mount_safe_info(server: &MockServer, owners: &[Address], threshold: u64, nonce: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/safes/{}/", checksum(&safe_address()))))
        .respond_with(ResponseTemplate::new(200).set_body_json(safe_info_json(owners, threshold, nonce)))
        .mount(server)
        .await;
}

pub async fn mount_bundle(server: &MockServer, hash: &H256, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/multisig-transactions/{}/", hash_hex(hash))))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

// ============================================================================
// NODE FIXTURES
// ============================================================================

pub fn rpc_result(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result
    }))
}

pub async fn mount_rpc(server: &MockServer, rpc_method: &str, result: Value) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(rpc_result(result))
        .mount(server)
        .await;
}

/// Mounts every call the execution path makes on a healthy node.
pub async fn mount_healthy_node(server: &MockServer, chain_id: u64, safe_nonce: u64, receipt_status: &str) {
    mount_rpc(server, "eth_chainId", json!(format!("0x{:x}", chain_id))).await;
    mount_rpc(server, "eth_call", json!(format!("0x{:064x}", safe_nonce))).await;
    mount_rpc(server, "eth_getTransactionCount", json!("0x3")).await;
    mount_rpc(server, "eth_gasPrice", json!("0x3b9aca00")).await;
    mount_rpc(server, "eth_estimateGas", json!("0x186a0")).await;
    mount_rpc(server, "eth_sendRawTransaction", json!(DUMMY_EXEC_TX_HASH)).await;
    mount_rpc(
        server,
        "eth_getTransactionReceipt",
        json!({
            "transactionHash": DUMMY_EXEC_TX_HASH,
            "status": receipt_status,
            "blockNumber": "0x10",
            "gasUsed": "0x15f90"
        }),
    )
    .await;
}
