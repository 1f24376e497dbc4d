//! Execution Coordinator
//!
//! Settles a pending transaction on-chain once enough owners have confirmed it.
//!
//! Flow:
//! 1. **Fetch Bundle**: pending record and confirmations from the relay
//! 2. **Integrity Check**: rebuild the record, recompute the hash, abort on mismatch
//! 3. **Idempotency**: relay executed flag, node chain id, on-chain Safe nonce
//! 4. **Aggregate**: owner-only, one per owner, recovered signer must match
//! 5. **Submit**: `execTransaction` in a locally signed EIP-155 transaction, await receipt

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::abi::encode_exec_transaction;
use crate::config::ExecutionConfig;
use crate::crypto::{recover_safe_signer, SafeSignatureKind, SignerProvider};
use crate::error::{Result, SafeError};
use crate::evm_client::EvmClient;
use crate::relay_client::{MultisigTransaction, ParsedConfirmation, RelayClient};
use crate::service::{ensure_filed_under, verified_record};
use crate::transaction::Account;
use crate::validation::{to_checksum_address, validate_address, validate_hash};

/// Result of a transaction submitted by this call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub transaction_hash: H256,
    pub executor: Address,
    pub safe_tx_hash: H256,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlreadyDoneReason {
    /// The relay reports the transaction as executed
    ExecutedOnRelay,
    /// The Safe's on-chain nonce has moved past the record's nonce
    NonceConsumed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Executed(ExecutionResult),
    /// Terminal success: nothing left to do for this hash
    AlreadyDone {
        safe_tx_hash: H256,
        transaction_hash: Option<H256>,
        reason: AlreadyDoneReason,
    },
}

/// Pacing parameters for submission and receipt polling.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
    pub gas_limit_multiplier_percent: u64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for ExecutionSettings {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            receipt_poll_interval: config.receipt_poll_interval(),
            receipt_timeout: config.receipt_timeout(),
            gas_limit_multiplier_percent: config.gas_limit_multiplier_percent,
        }
    }
}

/// Execution service submitting threshold-confirmed transactions.
pub struct ExecutionService {
    /// Shared relay client
    relay: Arc<RelayClient>,
    /// Node client for the Safe's chain
    node: Arc<EvmClient>,
    /// Executor key (pays gas; need not be an owner)
    signer: Arc<dyn SignerProvider>,
    /// Chain id used for domain separation and EIP-155
    chain_id: u64,
    settings: ExecutionSettings,
}

impl ExecutionService {
    pub fn new(
        relay: Arc<RelayClient>,
        node: Arc<EvmClient>,
        signer: Arc<dyn SignerProvider>,
        chain_id: u64,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            relay,
            node,
            signer,
            chain_id,
            settings,
        }
    }

    /// Executes the transaction filed under `safe_tx_hash`.
    ///
    /// # Returns
    ///
    /// * `Ok(ExecutionOutcome::Executed)` - Submitted and mined successfully
    /// * `Ok(ExecutionOutcome::AlreadyDone)` - Already executed, by an earlier run or a competing executor
    /// * `Err(SafeError::Integrity)` - Relay bundle does not hash to `safe_tx_hash`
    /// * `Err(SafeError::BelowThreshold)` - Not enough valid owner confirmations
    /// * `Err(SafeError::Protocol)` - Chain mismatch, queued nonce, node rejection or revert
    ///
    /// A rejected or reverted submission re-reads the Safe nonce: if another executor
    /// consumed it in the meantime the result is `AlreadyDone`, not an error.
    pub async fn execute(&self, safe: &str, safe_tx_hash: &str) -> Result<ExecutionOutcome> {
        let safe = validate_address(safe, "safe")?;
        let expected = validate_hash(safe_tx_hash, "safe_tx_hash")?;

        // 1-2. Fetch and verify before anything else
        let bundle = self.relay.get_transaction(&expected).await?;
        ensure_filed_under(&bundle, &safe, &expected)?;
        let record = verified_record(&bundle, &safe, self.chain_id, &expected)?;

        // 3. Idempotency
        if bundle.is_executed {
            info!("{:#x} already executed according to the relay", expected);
            return Ok(ExecutionOutcome::AlreadyDone {
                safe_tx_hash: expected,
                transaction_hash: bundle.executed_transaction_hash(),
                reason: AlreadyDoneReason::ExecutedOnRelay,
            });
        }

        let node_chain_id = self.node.chain_id().await?;
        if node_chain_id != self.chain_id {
            return Err(SafeError::Protocol {
                status: 0,
                body: format!(
                    "node at {} reports chain id {}, expected {}",
                    self.node.rpc_url(),
                    node_chain_id,
                    self.chain_id
                ),
            });
        }

        let onchain_nonce = self.node.get_safe_nonce(&safe).await?;
        if onchain_nonce > record.nonce {
            info!(
                "Safe {:#x} nonce is {} (> {}); {:#x} is settled",
                safe, onchain_nonce, record.nonce, expected
            );
            return Ok(ExecutionOutcome::AlreadyDone {
                safe_tx_hash: expected,
                transaction_hash: bundle.executed_transaction_hash(),
                reason: AlreadyDoneReason::NonceConsumed,
            });
        }
        if onchain_nonce < record.nonce {
            return Err(SafeError::Protocol {
                status: 0,
                body: format!(
                    "transaction nonce {} is queued behind on-chain nonce {}; execute earlier nonces first",
                    record.nonce, onchain_nonce
                ),
            });
        }

        // 4. Aggregate against the current owner set
        let account = self
            .relay
            .get_safe_info(&safe)
            .await?
            .to_account(self.chain_id)?;
        let signatures = aggregate_signatures(&bundle, &account, &expected)?;

        // 5. Submit
        let calldata = encode_exec_transaction(&record, &signatures);
        match self.submit(&safe, &calldata).await {
            Ok((transaction_hash, block_number)) => {
                info!(
                    "Executed {:#x} on Safe {:#x} in transaction {:#x}",
                    expected, safe, transaction_hash
                );
                Ok(ExecutionOutcome::Executed(ExecutionResult {
                    transaction_hash,
                    executor: self.signer.address(),
                    safe_tx_hash: expected,
                    block_number,
                }))
            }
            // A competing executor may have settled the nonce after our pre-check
            Err(err @ SafeError::Protocol { .. }) => match self.node.get_safe_nonce(&safe).await {
                Ok(nonce) if nonce > record.nonce => {
                    info!(
                        "Safe {:#x} nonce moved to {} while submitting; {:#x} was executed by another executor",
                        safe, nonce, expected
                    );
                    Ok(ExecutionOutcome::AlreadyDone {
                        safe_tx_hash: expected,
                        transaction_hash: None,
                        reason: AlreadyDoneReason::NonceConsumed,
                    })
                }
                _ => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Signs and broadcasts `execTransaction`, then waits for a successful receipt.
    async fn submit(&self, safe: &Address, calldata: &[u8]) -> Result<(H256, Option<u64>)> {
        let transaction_hash = self
            .node
            .sign_and_send(
                self.signer.as_ref(),
                safe,
                calldata,
                self.chain_id,
                self.settings.gas_limit_multiplier_percent,
            )
            .await?;

        let receipt = self
            .node
            .wait_for_receipt(
                &transaction_hash,
                self.settings.receipt_poll_interval,
                self.settings.receipt_timeout,
            )
            .await?;
        if !receipt.succeeded() {
            return Err(SafeError::Protocol {
                status: 0,
                body: format!(
                    "execTransaction {:#x} reverted (status {})",
                    transaction_hash,
                    receipt.status.as_deref().unwrap_or("missing")
                ),
            });
        }
        Ok((transaction_hash, receipt.block_number()))
    }
}

/// Selects valid owner confirmations and concatenates them in ascending owner order.
///
/// Keeps at most one confirmation per current owner. ECDSA signatures must recover to
/// the owner they are filed under; approved-hash signatures must name that owner in
/// `r`. Contract signatures are skipped (their dynamic part is not carried by the
/// bundle).
///
/// # Returns
///
/// * `Ok(Vec<u8>)` - Exactly `threshold` signatures, 65 bytes each
/// * `Err(SafeError::BelowThreshold)` - Fewer valid confirmations than the threshold
pub fn aggregate_signatures(
    bundle: &MultisigTransaction,
    account: &Account,
    safe_tx_hash: &H256,
) -> Result<Vec<u8>> {
    let mut seen: HashSet<Address> = HashSet::new();
    let mut valid: Vec<ParsedConfirmation> = Vec::new();

    for confirmation in bundle.parsed_confirmations() {
        let owner = confirmation.owner;
        if !account.is_owner(&owner) {
            warn!("Skipping confirmation from non-owner {}", to_checksum_address(&owner));
            continue;
        }
        if seen.contains(&owner) {
            debug!("Skipping duplicate confirmation from {}", to_checksum_address(&owner));
            continue;
        }
        if !signature_matches_owner(safe_tx_hash, &confirmation) {
            warn!(
                "Skipping confirmation from {}: signature does not match the owner",
                to_checksum_address(&owner)
            );
            continue;
        }
        seen.insert(owner);
        valid.push(confirmation);
    }

    let need = account.threshold as usize;
    if valid.len() < need {
        return Err(SafeError::BelowThreshold {
            have: valid.len(),
            need,
        });
    }

    valid.sort_by(|a, b| a.owner.cmp(&b.owner));
    Ok(valid
        .into_iter()
        .take(need)
        .flat_map(|c| c.signature)
        .collect())
}

fn signature_matches_owner(safe_tx_hash: &H256, confirmation: &ParsedConfirmation) -> bool {
    let signature = &confirmation.signature;
    if signature.len() != 65 {
        return false;
    }
    match SafeSignatureKind::from_v(signature[64]) {
        Ok(SafeSignatureKind::Eip712) | Ok(SafeSignatureKind::EthSign) => {
            matches!(recover_safe_signer(safe_tx_hash, signature), Ok(Some(recovered)) if recovered == confirmation.owner)
        }
        Ok(SafeSignatureKind::ApprovedHash) => {
            // r holds the approving owner, left-padded to 32 bytes
            let r = U256::from_big_endian(&signature[..32]);
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(confirmation.owner.as_bytes());
            r == U256::from_big_endian(&word)
        }
        Ok(SafeSignatureKind::Contract) | Err(_) => false,
    }
}
