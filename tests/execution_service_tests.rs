//! Unit tests for the execution coordinator (service::execution module)

use std::sync::Arc;
use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use safe_quorum::crypto::{recover_safe_signer, SignerProvider};
use safe_quorum::evm_client::EvmClient;
use safe_quorum::relay_client::MultisigTransaction;
use safe_quorum::service::execution::aggregate_signatures;
use safe_quorum::service::{AlreadyDoneReason, ExecutionOutcome, ExecutionService, ExecutionSettings};
use safe_quorum::transaction::{compute_hash, Account};
use safe_quorum::SafeError;
use serde_json::{json, Value};
use wiremock::matchers::{any, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    address, bundle_json, checksum, confirmation_json, hash_hex, mount_bundle, mount_healthy_node, mount_rpc,
    mount_safe_info, owner_signer, relay_client, rpc_result, safe_address, shared_signer, transfer_record, DUMMY_ATTACKER_ADDR,
    DUMMY_EXEC_TX_HASH, DUMMY_SAFE_ADDR, DUMMY_SUBMISSION_DATE, TEST_CHAIN_ID,
};

/// Executor key; deliberately not an owner
const EXECUTOR: u8 = 9;

fn owners_abc() -> Vec<Address> {
    vec![owner_signer(1).address(), owner_signer(2).address(), owner_signer(3).address()]
}

fn settings() -> ExecutionSettings {
    ExecutionSettings {
        receipt_poll_interval: Duration::from_millis(10),
        receipt_timeout: Duration::from_secs(1),
        gas_limit_multiplier_percent: 120,
    }
}

fn service(relay: &MockServer, node: &MockServer) -> ExecutionService {
    ExecutionService::new(
        relay_client(relay),
        Arc::new(EvmClient::new(node.uri(), Duration::from_secs(5)).unwrap()),
        shared_signer(EXECUTOR),
        TEST_CHAIN_ID,
        settings(),
    )
}

/// Mounts a nonce-5 transfer confirmed by the given owners, plus the A/B/C 2-of-3 account.
async fn mount_pending(relay: &MockServer, confirmers: &[u8]) -> H256 {
    let record = transfer_record(5);
    let hash = compute_hash(&record, &safe_address(), TEST_CHAIN_ID);
    let confirmations = confirmers
        .iter()
        .map(|n| confirmation_json(&owner_signer(*n), &hash))
        .collect();
    mount_bundle(relay, &hash, bundle_json(&record, &hash, confirmations, false)).await;
    mount_safe_info(relay, &owners_abc(), 2, 5).await;
    hash
}

fn account(threshold: u64) -> Account {
    Account::new(safe_address(), owners_abc(), threshold, U256::from(5), TEST_CHAIN_ID).unwrap()
}

fn bundle(hash: &H256, confirmations: Vec<Value>) -> MultisigTransaction {
    serde_json::from_value(bundle_json(&transfer_record(5), hash, confirmations, false)).unwrap()
}

/// Confirmation entry with a raw signature filed under `owner`.
fn raw_confirmation(owner: &Address, signature: &[u8]) -> Value {
    json!({
        "owner": checksum(owner),
        "submissionDate": DUMMY_SUBMISSION_DATE,
        "signature": format!("0x{}", hex::encode(signature)),
        "signatureType": "APPROVED_HASH"
    })
}

/// Bodies of all JSON-RPC requests the node received for `rpc_method`.
async fn rpc_requests(node: &MockServer, rpc_method: &str) -> Vec<Value> {
    node.received_requests()
        .await
        .unwrap()
        .iter()
        .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
        .filter(|body| body["method"] == rpc_method)
        .collect()
}

// ============================================================================
// EXECUTION FLOW
// ============================================================================

/// What is tested: A 2-of-3 transaction confirmed by A and B executes
/// Why: Threshold met, hash verified, nonce current; the executor settles it on-chain
#[tokio::test]
async fn test_execute_threshold_met() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    mount_healthy_node(&node, TEST_CHAIN_ID, 5, "0x1").await;

    let outcome = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap();
    match outcome {
        ExecutionOutcome::Executed(result) => {
            assert_eq!(hash_hex(&result.transaction_hash), DUMMY_EXEC_TX_HASH);
            assert_eq!(result.safe_tx_hash, hash);
            assert_eq!(result.executor, owner_signer(EXECUTOR).address());
            assert_eq!(result.block_number, Some(16));
        }
        other => panic!("expected Executed, got {:?}", other),
    }

    // The broadcast transaction carries execTransaction with both signatures in owner order
    let sent = rpc_requests(&node, "eth_sendRawTransaction").await;
    assert_eq!(sent.len(), 1);
    let raw = sent[0]["params"][0].as_str().unwrap().to_string();
    let expected_signatures = aggregate_signatures(
        &bundle(
            &hash,
            vec![
                confirmation_json(&owner_signer(1), &hash),
                confirmation_json(&owner_signer(2), &hash),
            ],
        ),
        &account(2),
        &hash,
    )
    .unwrap();
    assert!(raw.contains("6a761202"));
    assert!(raw.contains(&hex::encode(&expected_signatures)));
}

/// What is tested: A relay bundle that does not hash to H aborts before any node call
/// Why: The relay must not be able to redirect an execution by editing the record
#[tokio::test]
async fn test_execute_tampered_bundle_is_integrity_error() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let honest = transfer_record(5);
    let hash = compute_hash(&honest, &safe_address(), TEST_CHAIN_ID);
    let mut tampered = honest.clone();
    tampered.to = address(DUMMY_ATTACKER_ADDR);
    let confirmations = vec![
        confirmation_json(&owner_signer(1), &hash),
        confirmation_json(&owner_signer(2), &hash),
    ];
    mount_bundle(&relay, &hash, bundle_json(&tampered, &hash, confirmations, false)).await;
    mount_safe_info(&relay, &owners_abc(), 2, 5).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&node)
        .await;

    let err = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap_err();
    assert!(matches!(err, SafeError::Integrity { expected, .. } if expected == hash));
    assert!(!err.is_retryable());
}

/// What is tested: A bundle the relay marks executed is AlreadyDone without node calls
/// Why: Re-running execute after success must be a no-op
#[tokio::test]
async fn test_execute_already_executed_on_relay() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let record = transfer_record(5);
    let hash = compute_hash(&record, &safe_address(), TEST_CHAIN_ID);
    mount_bundle(&relay, &hash, bundle_json(&record, &hash, vec![], true)).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&node)
        .await;

    let outcome = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap();
    match outcome {
        ExecutionOutcome::AlreadyDone {
            safe_tx_hash,
            transaction_hash,
            reason,
        } => {
            assert_eq!(safe_tx_hash, hash);
            assert_eq!(reason, AlreadyDoneReason::ExecutedOnRelay);
            assert_eq!(transaction_hash.map(|h| hash_hex(&h)).as_deref(), Some(DUMMY_EXEC_TX_HASH));
        }
        other => panic!("expected AlreadyDone, got {:?}", other),
    }
}

/// What is tested: An on-chain nonce past the record's nonce is AlreadyDone
/// Why: The relay may lag behind the chain after another executor settled the transaction
#[tokio::test]
async fn test_execute_nonce_consumed() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    mount_rpc(&node, "eth_chainId", json!(format!("0x{:x}", TEST_CHAIN_ID))).await;
    mount_rpc(&node, "eth_call", json!(format!("0x{:064x}", 6))).await;

    let outcome = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ExecutionOutcome::AlreadyDone {
            reason: AlreadyDoneReason::NonceConsumed,
            ..
        }
    ));
    assert!(rpc_requests(&node, "eth_sendRawTransaction").await.is_empty());
}

/// What is tested: A record queued behind the on-chain nonce is refused
/// Why: execTransaction would revert until earlier nonces execute
#[tokio::test]
async fn test_execute_queued_nonce_is_protocol_error() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    mount_rpc(&node, "eth_chainId", json!(format!("0x{:x}", TEST_CHAIN_ID))).await;
    mount_rpc(&node, "eth_call", json!(format!("0x{:064x}", 4))).await;

    let err = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap_err();
    match err {
        SafeError::Protocol { status, body } => {
            assert_eq!(status, 0);
            assert!(body.contains("queued behind"));
        }
        other => panic!("expected Protocol, got {:?}", other),
    }
}

/// What is tested: A node on another chain is refused before signing anything
/// Why: The EIP-155 chain id and the domain separator must match the node
#[tokio::test]
async fn test_execute_chain_mismatch() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    mount_rpc(&node, "eth_chainId", json!("0x1")).await;

    let err = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap_err();
    match err {
        SafeError::Protocol { status, body } => {
            assert_eq!(status, 0);
            assert!(body.contains("chain id 1"));
        }
        other => panic!("expected Protocol, got {:?}", other),
    }
}

/// What is tested: One confirmation on a 2-of-3 Safe is BelowThreshold and nothing is sent
/// Why: Submitting would waste gas on a guaranteed revert
#[tokio::test]
async fn test_execute_below_threshold() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1]).await;
    mount_rpc(&node, "eth_chainId", json!(format!("0x{:x}", TEST_CHAIN_ID))).await;
    mount_rpc(&node, "eth_call", json!(format!("0x{:064x}", 5))).await;

    let err = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap_err();
    assert!(matches!(err, SafeError::BelowThreshold { have: 1, need: 2 }));
    assert!(rpc_requests(&node, "eth_sendRawTransaction").await.is_empty());
}

/// What is tested: A mined but reverted execution is reported as an error
/// Why: A failed receipt means the Safe did not execute
#[tokio::test]
async fn test_execute_reverted_receipt() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    mount_healthy_node(&node, TEST_CHAIN_ID, 5, "0x0").await;

    let err = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap_err();
    assert!(matches!(err, SafeError::Protocol { status: 0, ref body } if body.contains("reverted")));
}

/// Mounts `eth_call` answering the Safe nonce `first` once, then `after` from then on.
async fn mount_nonce_moving(node: &MockServer, first: u64, after: u64) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_call" })))
        .respond_with(rpc_result(json!(format!("0x{:064x}", first))))
        .up_to_n_times(1)
        .mount(node)
        .await;
    mount_rpc(node, "eth_call", json!(format!("0x{:064x}", after))).await;
}

/// What is tested: A competing executor settling the nonce between pre-check and estimate is AlreadyDone
/// Why: Losing the race to another executor is the desired end state, not a failure
#[tokio::test]
async fn test_execute_race_lost_at_estimate_is_already_done() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    mount_rpc(&node, "eth_chainId", json!(format!("0x{:x}", TEST_CHAIN_ID))).await;
    mount_nonce_moving(&node, 5, 6).await;
    mount_rpc(&node, "eth_getTransactionCount", json!("0x3")).await;
    mount_rpc(&node, "eth_gasPrice", json!("0x3b9aca00")).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_estimateGas" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted: GS026" }
        })))
        .mount(&node)
        .await;

    let outcome = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap();
    match outcome {
        ExecutionOutcome::AlreadyDone {
            safe_tx_hash,
            transaction_hash,
            reason,
        } => {
            assert_eq!(safe_tx_hash, hash);
            assert_eq!(reason, AlreadyDoneReason::NonceConsumed);
            assert!(transaction_hash.is_none());
        }
        other => panic!("expected AlreadyDone, got {:?}", other),
    }
    assert!(rpc_requests(&node, "eth_sendRawTransaction").await.is_empty());
}

/// What is tested: A revert caused by another executor consuming the nonce first is AlreadyDone
/// Why: Both executors broadcast; the loser's receipt reverts but the Safe did execute H
#[tokio::test]
async fn test_execute_race_lost_at_receipt_is_already_done() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    // Registered first so the pre-check sees 5 and the re-read sees 6
    mount_nonce_moving(&node, 5, 6).await;
    mount_healthy_node(&node, TEST_CHAIN_ID, 6, "0x0").await;

    let outcome = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ExecutionOutcome::AlreadyDone {
            reason: AlreadyDoneReason::NonceConsumed,
            ..
        }
    ));
    assert_eq!(rpc_requests(&node, "eth_sendRawTransaction").await.len(), 1);
}

/// What is tested: A node rejection with the nonce unchanged is still an error
/// Why: Only a consumed nonce turns a failed submission into AlreadyDone
#[tokio::test]
async fn test_execute_rejection_with_unchanged_nonce_is_error() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let hash = mount_pending(&relay, &[1, 2]).await;
    mount_rpc(&node, "eth_chainId", json!(format!("0x{:x}", TEST_CHAIN_ID))).await;
    mount_rpc(&node, "eth_call", json!(format!("0x{:064x}", 5))).await;
    mount_rpc(&node, "eth_getTransactionCount", json!("0x3")).await;
    mount_rpc(&node, "eth_gasPrice", json!("0x3b9aca00")).await;
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_partial_json(json!({ "method": "eth_estimateGas" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32000, "message": "execution reverted: GS013" }
        })))
        .mount(&node)
        .await;

    let err = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap_err();
    assert!(matches!(err, SafeError::Protocol { ref body, .. } if body.contains("GS013")));
}

// ============================================================================
// UNTRUSTED INPUT
// ============================================================================

/// What is tested: A bundle the relay files under another Safe is refused before any node call
/// Why: Signatures collected for one Safe must never be replayed against another
#[tokio::test]
async fn test_execute_bundle_for_other_safe_is_rejected() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    let record = transfer_record(5);
    let hash = compute_hash(&record, &safe_address(), TEST_CHAIN_ID);
    let mut body = bundle_json(&record, &hash, vec![confirmation_json(&owner_signer(1), &hash)], false);
    body["safe"] = json!(checksum(&address(DUMMY_ATTACKER_ADDR)));
    mount_bundle(&relay, &hash, body).await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&node)
        .await;

    let err = service(&relay, &node)
        .execute(DUMMY_SAFE_ADDR, &hash_hex(&hash))
        .await
        .unwrap_err();
    assert!(matches!(err, SafeError::MalformedResponse { .. }));
    assert!(!err.is_retryable());
}

/// What is tested: Malformed hash or Safe address fails before any relay or node request
/// Why: Local validation is fail-fast on the path that spends gas too
#[tokio::test]
async fn test_execute_invalid_input_makes_no_requests() {
    let relay = MockServer::start().await;
    let node = MockServer::start().await;
    for server in [&relay, &node] {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
    }
    let executions = service(&relay, &node);
    let hash = hash_hex(&compute_hash(&transfer_record(5), &safe_address(), TEST_CHAIN_ID));

    let err = executions.execute(DUMMY_SAFE_ADDR, "0x1234").await.unwrap_err();
    assert!(matches!(err, SafeError::InvalidHash { .. }));

    let err = executions.execute("0xzz", &hash).await.unwrap_err();
    assert!(matches!(err, SafeError::InvalidAddress { .. }));
    assert!(err.is_local_validation());
}

// ============================================================================
// SIGNATURE AGGREGATION
// ============================================================================

/// What is tested: Signatures come out in ascending owner order, exactly threshold of them
/// Why: The Safe contract rejects unsorted signature blobs
#[test]
fn test_aggregate_sorts_by_owner() {
    let hash = compute_hash(&transfer_record(5), &safe_address(), TEST_CHAIN_ID);
    let confirmations = vec![
        confirmation_json(&owner_signer(3), &hash),
        confirmation_json(&owner_signer(1), &hash),
        confirmation_json(&owner_signer(2), &hash),
    ];

    let signatures = aggregate_signatures(&bundle(&hash, confirmations), &account(2), &hash).unwrap();
    assert_eq!(signatures.len(), 2 * 65);

    let mut sorted = owners_abc();
    sorted.sort();
    for (i, chunk) in signatures.chunks(65).enumerate() {
        assert_eq!(recover_safe_signer(&hash, chunk).unwrap(), Some(sorted[i]));
    }
}

/// What is tested: Duplicates, non-owners and signatures filed under the wrong owner are ignored
/// Why: Only distinct current owners with genuine signatures count toward the threshold
#[test]
fn test_aggregate_ignores_invalid_confirmations() {
    let hash = compute_hash(&transfer_record(5), &safe_address(), TEST_CHAIN_ID);
    let a = owner_signer(1);
    let forged = owner_signer(9).sign_digest(&hash).unwrap().to_safe_bytes();
    let confirmations = vec![
        confirmation_json(&a, &hash),
        confirmation_json(&a, &hash),
        confirmation_json(&owner_signer(9), &hash),
        raw_confirmation(&owner_signer(2).address(), &forged),
    ];

    let err = aggregate_signatures(&bundle(&hash, confirmations), &account(2), &hash).unwrap_err();
    assert!(matches!(err, SafeError::BelowThreshold { have: 1, need: 2 }));
}

/// What is tested: Approved-hash signatures count only for the owner named in r
/// Why: A v=1 signature is validated on-chain against approvedHashes[r][hash]
#[test]
fn test_aggregate_approved_hash_signatures() {
    let hash = compute_hash(&transfer_record(5), &safe_address(), TEST_CHAIN_ID);
    let b = owner_signer(2).address();
    let c = owner_signer(3).address();

    let approved_by = |owner: &Address| {
        let mut signature = vec![0u8; 65];
        signature[12..32].copy_from_slice(owner.as_bytes());
        signature[64] = 1;
        signature
    };

    let confirmations = vec![
        confirmation_json(&owner_signer(1), &hash),
        raw_confirmation(&b, &approved_by(&b)),
    ];
    let signatures = aggregate_signatures(&bundle(&hash, confirmations), &account(2), &hash).unwrap();
    assert_eq!(signatures.len(), 130);
    assert!(signatures.chunks(65).any(|chunk| chunk == approved_by(&b).as_slice()));

    // Filed under C but approving as B
    let confirmations = vec![
        confirmation_json(&owner_signer(1), &hash),
        raw_confirmation(&c, &approved_by(&b)),
    ];
    assert!(matches!(
        aggregate_signatures(&bundle(&hash, confirmations), &account(2), &hash),
        Err(SafeError::BelowThreshold { have: 1, need: 2 })
    ));
}
