//! Unit tests for the proposal coordinator (service::proposal module)

use ethereum_types::{Address, U256};
use safe_quorum::crypto::{recover_safe_signer, SignerProvider};
use safe_quorum::service::ProposalService;
use safe_quorum::transaction::{compute_hash, CallLeg, Operation, DEFAULT_MULTISEND_CALL_ONLY};
use safe_quorum::validation::parse_hex_bytes;
use safe_quorum::SafeError;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "helpers.rs"]
mod test_helpers;
use test_helpers::{
    address, checksum, hash_hex, mount_safe_info, owner_signer, relay_client, safe_address, shared_signer,
    transfer_record, DUMMY_SAFE_ADDR, TEST_CHAIN_ID,
};

fn proposal_path() -> String {
    format!("/v1/safes/{}/multisig-transactions/", checksum(&safe_address()))
}

fn transfer_leg() -> CallLeg {
    let record = transfer_record(0);
    CallLeg {
        to: record.to,
        value: record.value,
        data: record.data,
        operation: record.operation,
    }
}

fn service(server: &MockServer, signer: u8) -> ProposalService {
    ProposalService::new(
        relay_client(server),
        shared_signer(signer),
        TEST_CHAIN_ID,
        address(DEFAULT_MULTISEND_CALL_ONLY),
    )
}

fn owners_abc() -> Vec<Address> {
    vec![owner_signer(1).address(), owner_signer(2).address(), owner_signer(3).address()]
}

// ============================================================================
// HAPPY PATH
// ============================================================================

/// What is tested: Owner A proposes a transfer at the Safe's current nonce
/// Why: Every later step looks the transaction up by the hash published here
#[tokio::test]
async fn test_owner_proposes_at_current_nonce() {
    let server = MockServer::start().await;
    mount_safe_info(&server, &owners_abc(), 2, 5).await;

    let expected = compute_hash(&transfer_record(5), &safe_address(), TEST_CHAIN_ID);
    let proposer = owner_signer(1).address();
    Mock::given(method("POST"))
        .and(path(proposal_path()))
        .and(body_partial_json(json!({
            "contractTransactionHash": hash_hex(&expected),
            "sender": checksum(&proposer),
            "nonce": "5",
            "operation": 0,
            "origin": "safe-quorum"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server, 1)
        .propose(DUMMY_SAFE_ADDR, vec![transfer_leg()], None)
        .await
        .unwrap();
    assert_eq!(outcome.safe_tx_hash, expected);
    assert_eq!(outcome.nonce, U256::from(5));
    assert_eq!(outcome.proposer, proposer);

    let requests = server.received_requests().await.unwrap();
    let post = requests
        .iter()
        .find(|r| r.method.to_string() == "POST")
        .unwrap();
    let body: Value = serde_json::from_slice(&post.body).unwrap();
    let signature = parse_hex_bytes(body["signature"].as_str().unwrap(), "signature").unwrap();
    assert_eq!(recover_safe_signer(&expected, &signature).unwrap(), Some(proposer));
}

/// What is tested: An explicit nonce overrides the fetched one
/// Why: Owners queue transactions at future nonces
#[tokio::test]
async fn test_explicit_nonce_is_used() {
    let server = MockServer::start().await;
    mount_safe_info(&server, &owners_abc(), 2, 5).await;
    Mock::given(method("POST"))
        .and(path(proposal_path()))
        .and(body_partial_json(json!({ "nonce": "9" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server, 2)
        .propose(DUMMY_SAFE_ADDR, vec![transfer_leg()], Some(U256::from(9)))
        .await
        .unwrap();
    assert_eq!(
        outcome.safe_tx_hash,
        compute_hash(&transfer_record(9), &safe_address(), TEST_CHAIN_ID)
    );
}

/// What is tested: Two legs are proposed as one MultiSendCallOnly delegatecall
/// Why: Batches must be atomic and signed once
#[tokio::test]
async fn test_batch_proposal_uses_multisend() {
    let server = MockServer::start().await;
    mount_safe_info(&server, &owners_abc(), 2, 0).await;
    Mock::given(method("POST"))
        .and(path(proposal_path()))
        .and(body_partial_json(json!({
            "to": checksum(&address(DEFAULT_MULTISEND_CALL_ONLY)),
            "operation": 1,
            "value": "0"
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = service(&server, 1)
        .propose(DUMMY_SAFE_ADDR, vec![transfer_leg(), transfer_leg()], None)
        .await
        .unwrap();
    assert_eq!(outcome.record.operation, Operation::DelegateCall);
}

// ============================================================================
// FAILURES
// ============================================================================

/// What is tested: Invalid input fails before any relay call
/// Why: Local validation is fail-fast
#[tokio::test]
async fn test_invalid_input_makes_no_relay_calls() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let proposals = service(&server, 1);

    let err = proposals.propose("0x1234", vec![transfer_leg()], None).await.unwrap_err();
    assert!(matches!(err, SafeError::InvalidAddress { .. }));

    let err = proposals.propose(DUMMY_SAFE_ADDR, vec![], None).await.unwrap_err();
    assert!(matches!(err, SafeError::InvalidPayload { .. }));

    let mut delegate = transfer_leg();
    delegate.operation = Operation::DelegateCall;
    let err = proposals
        .propose(DUMMY_SAFE_ADDR, vec![transfer_leg(), delegate], None)
        .await
        .unwrap_err();
    assert!(matches!(err, SafeError::InvalidPayload { .. }));
    assert!(err.is_local_validation());
}

/// What is tested: A non-owner signer is refused before publishing
/// Why: The relay would reject it anyway, and the hash must not be signed by outsiders
#[tokio::test]
async fn test_non_owner_is_rejected() {
    let server = MockServer::start().await;
    mount_safe_info(&server, &owners_abc(), 2, 5).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = service(&server, 7)
        .propose(DUMMY_SAFE_ADDR, vec![transfer_leg()], None)
        .await
        .unwrap_err();
    match err {
        SafeError::NotOwner { signer, safe } => {
            assert_eq!(signer, owner_signer(7).address());
            assert_eq!(safe, safe_address());
        }
        other => panic!("expected NotOwner, got {:?}", other),
    }
}

/// What is tested: Relay rejection surfaces status and body
/// Why: Nonce conflicts and validation failures must be diagnosable
#[tokio::test]
async fn test_relay_rejection_is_protocol_error() {
    let server = MockServer::start().await;
    mount_safe_info(&server, &owners_abc(), 2, 5).await;
    Mock::given(method("POST"))
        .and(path(proposal_path()))
        .respond_with(ResponseTemplate::new(422).set_body_string("{\"nonce\":[\"Nonce already executed\"]}"))
        .mount(&server)
        .await;

    let err = service(&server, 1)
        .propose(DUMMY_SAFE_ADDR, vec![transfer_leg()], None)
        .await
        .unwrap_err();
    match err {
        SafeError::Protocol { status, body } => {
            assert_eq!(status, 422);
            assert!(body.contains("Nonce already executed"));
        }
        other => panic!("expected Protocol, got {:?}", other),
    }
}
