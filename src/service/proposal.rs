//! Proposal Coordinator
//!
//! Turns one or more call legs into a signed Safe transaction and publishes it to
//! the relay together with the proposer's own confirmation.
//!
//! Flow:
//! 1. **Validate**: Safe address and legs, before any network call
//! 2. **Fetch Account**: owners and (unless given) the current nonce, right before signing
//! 3. **Sign**: compute the safeTxHash locally and sign it
//! 4. **Publish**: POST the record, hash, sender and signature

use std::sync::Arc;

use ethereum_types::{Address, H256, U256};
use serde::Serialize;
use tracing::{info, warn};

use crate::crypto::SignerProvider;
use crate::error::{Result, SafeError};
use crate::relay_client::{ProposeRequest, RelayClient};
use crate::transaction::{assemble_legs, build_record_from_leg, compute_hash, CallLeg, FeeParams, TransactionRecord};
use crate::validation::validate_address;

/// Origin tag attached to proposals published by this client.
const PROPOSAL_ORIGIN: &str = "safe-quorum";

/// Result of a successful proposal.
#[derive(Debug, Clone, Serialize)]
pub struct ProposalOutcome {
    pub safe_tx_hash: H256,
    pub nonce: U256,
    pub proposer: Address,
    pub record: TransactionRecord,
}

/// Proposal service publishing new transactions to the relay.
pub struct ProposalService {
    /// Shared relay client
    relay: Arc<RelayClient>,
    /// Proposer signing capability
    signer: Arc<dyn SignerProvider>,
    /// Chain id used for domain separation
    chain_id: u64,
    /// MultiSendCallOnly deployment used for multi-leg proposals
    multisend_call_only: Address,
}

impl ProposalService {
    /// Creates a new proposal service
    ///
    /// # Arguments
    ///
    /// * `relay` - Shared relay client
    /// * `signer` - Signing capability of the proposing owner
    /// * `chain_id` - Chain the Safe lives on
    /// * `multisend_call_only` - Batching contract for multi-leg proposals
    pub fn new(
        relay: Arc<RelayClient>,
        signer: Arc<dyn SignerProvider>,
        chain_id: u64,
        multisend_call_only: Address,
    ) -> Self {
        Self {
            relay,
            signer,
            chain_id,
            multisend_call_only,
        }
    }

    /// Proposes `legs` as one transaction on `safe`.
    ///
    /// # Arguments
    ///
    /// * `safe` - Safe address (EIP-55 checked)
    /// * `legs` - One leg is used as-is, several are batched through MultiSendCallOnly
    /// * `nonce` - Explicit nonce; the Safe's current nonce when `None`
    ///
    /// # Returns
    ///
    /// * `Ok(ProposalOutcome)` - Published hash and nonce
    /// * `Err(SafeError::NotOwner)` - Signer is not an owner of the Safe
    /// * `Err(SafeError::Protocol)` - Relay rejected the proposal
    pub async fn propose(&self, safe: &str, legs: Vec<CallLeg>, nonce: Option<U256>) -> Result<ProposalOutcome> {
        let safe = validate_address(safe, "safe")?;
        let leg = assemble_legs(legs, &self.multisend_call_only)?;
        let proposer = self.signer.address();

        let account = self
            .relay
            .get_safe_info(&safe)
            .await?
            .to_account(self.chain_id)?;
        if !account.is_owner(&proposer) {
            return Err(SafeError::NotOwner { signer: proposer, safe });
        }

        let nonce = match nonce {
            Some(explicit) => {
                if explicit < account.nonce {
                    warn!(
                        "Explicit nonce {} is below the Safe's current nonce {}; the proposal can never execute",
                        explicit, account.nonce
                    );
                }
                explicit
            }
            None => account.nonce,
        };

        let record = build_record_from_leg(leg, FeeParams::default(), nonce);
        let safe_tx_hash = compute_hash(&record, &safe, self.chain_id);
        let signature = self.signer.sign_digest(&safe_tx_hash)?;

        let request = ProposeRequest::new(
            &record,
            &safe_tx_hash,
            &proposer,
            signature.to_safe_hex(),
            Some(PROPOSAL_ORIGIN.to_string()),
        );
        self.relay.propose_transaction(&safe, &request).await?;

        info!(
            "Proposed {:#x} on Safe {:#x} at nonce {} (proposer {:#x})",
            safe_tx_hash, safe, nonce, proposer
        );

        Ok(ProposalOutcome {
            safe_tx_hash,
            nonce,
            proposer,
            record,
        })
    }
}
