//! Read path: account info and pending transactions. No signing, no side effects.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{Result, SafeError};
use crate::relay_client::{MultisigTransaction, RelayClient};
use crate::transaction::Account;
use crate::validation::validate_address;

/// Largest page the hosted relay serves.
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: u32,
    pub offset: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { limit: 20, offset: 0 }
    }
}

/// One pending transaction with its distinct-owner confirmation count.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub safe_tx_hash: String,
    pub confirmations: usize,
    pub threshold: u64,
    pub bundle: MultisigTransaction,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingList {
    pub count: u64,
    pub next: Option<String>,
    pub transactions: Vec<PendingSummary>,
}

pub struct QueryService {
    relay: Arc<RelayClient>,
    chain_id: u64,
}

impl QueryService {
    pub fn new(relay: Arc<RelayClient>, chain_id: u64) -> Self {
        Self { relay, chain_id }
    }

    /// Owners, threshold and nonce of a Safe.
    pub async fn account_info(&self, safe: &str) -> Result<Account> {
        let safe = validate_address(safe, "safe")?;
        self.relay.get_safe_info(&safe).await?.to_account(self.chain_id)
    }

    /// One page of unexecuted transactions, newest first as the relay orders them.
    ///
    /// Confirmation counts only include current owners, each counted once.
    pub async fn list_pending(&self, safe: &str, page: PageRequest) -> Result<PendingList> {
        let address = validate_address(safe, "safe")?;
        if page.limit == 0 || page.limit > MAX_PAGE_LIMIT {
            return Err(SafeError::invalid_payload(
                "limit",
                format!("must be within 1..={}, got {}", MAX_PAGE_LIMIT, page.limit),
            ));
        }

        let account = self.relay.get_safe_info(&address).await?.to_account(self.chain_id)?;
        let listed = self.relay.list_pending(&address, page.limit, page.offset).await?;

        let transactions = listed
            .results
            .into_iter()
            .map(|bundle| PendingSummary {
                safe_tx_hash: bundle.safe_tx_hash.clone(),
                confirmations: bundle.confirmation_count(&account.owners),
                threshold: account.threshold,
                bundle,
            })
            .collect();

        Ok(PendingList {
            count: listed.count,
            next: listed.next,
            transactions,
        })
    }
}
