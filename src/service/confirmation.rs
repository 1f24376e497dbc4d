//! Confirmation Coordinator
//!
//! Adds the local owner's signature to a pending transaction. Submission has
//! ensure-present semantics: confirming twice is a success, not an error.

use std::sync::Arc;

use ethereum_types::{Address, H256};
use serde::Serialize;
use tracing::info;

use crate::crypto::SignerProvider;
use crate::error::Result;
use crate::relay_client::{ConfirmationSubmission, RelayClient};
use crate::service::{ensure_filed_under, verified_record};
use crate::validation::{validate_address, validate_hash};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// A new confirmation was stored by the relay
    Submitted { safe_tx_hash: H256, owner: Address },
    /// This owner's confirmation was already present
    AlreadyConfirmed { safe_tx_hash: H256, owner: Address },
}

/// Confirmation service adding owner signatures.
pub struct ConfirmationService {
    relay: Arc<RelayClient>,
    signer: Arc<dyn SignerProvider>,
    chain_id: u64,
}

impl ConfirmationService {
    pub fn new(relay: Arc<RelayClient>, signer: Arc<dyn SignerProvider>, chain_id: u64) -> Self {
        Self {
            relay,
            signer,
            chain_id,
        }
    }

    /// Signs a caller-supplied hash and submits it without inspecting the bundle.
    ///
    /// The caller vouches for the hash. Use [`confirm`](Self::confirm) to check the
    /// relay's bundle first.
    pub async fn confirm_hash(&self, safe: &str, safe_tx_hash: &str) -> Result<ConfirmOutcome> {
        validate_address(safe, "safe")?;
        let safe_tx_hash = validate_hash(safe_tx_hash, "safe_tx_hash")?;
        self.sign_and_submit(safe_tx_hash).await
    }

    /// Verifies the bundle filed under `safe_tx_hash`, then confirms it.
    ///
    /// # Returns
    ///
    /// * `Ok(ConfirmOutcome)` - Confirmation present after the call
    /// * `Err(SafeError::Integrity)` - Bundle contents do not hash to `safe_tx_hash`
    pub async fn confirm(&self, safe: &str, safe_tx_hash: &str) -> Result<ConfirmOutcome> {
        let safe = validate_address(safe, "safe")?;
        let expected = validate_hash(safe_tx_hash, "safe_tx_hash")?;

        let bundle = self.relay.get_transaction(&expected).await?;
        ensure_filed_under(&bundle, &safe, &expected)?;
        verified_record(&bundle, &safe, self.chain_id, &expected)?;

        let owner = self.signer.address();
        if bundle.is_confirmed_by(&owner) {
            info!("Owner {:#x} already confirmed {:#x}", owner, expected);
            return Ok(ConfirmOutcome::AlreadyConfirmed {
                safe_tx_hash: expected,
                owner,
            });
        }

        self.sign_and_submit(expected).await
    }

    async fn sign_and_submit(&self, safe_tx_hash: H256) -> Result<ConfirmOutcome> {
        let owner = self.signer.address();
        let signature = self.signer.sign_digest(&safe_tx_hash)?;

        match self
            .relay
            .submit_confirmation(&safe_tx_hash, &signature.to_safe_hex())
            .await?
        {
            ConfirmationSubmission::Created => {
                info!("Confirmed {:#x} as owner {:#x}", safe_tx_hash, owner);
                Ok(ConfirmOutcome::Submitted { safe_tx_hash, owner })
            }
            ConfirmationSubmission::AlreadyPresent => Ok(ConfirmOutcome::AlreadyConfirmed { safe_tx_hash, owner }),
        }
    }
}
