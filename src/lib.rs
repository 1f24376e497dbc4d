//! Safe Quorum Library
//!
//! This crate coordinates N-of-M Safe multisig transactions off-chain.
//! It builds candidate transactions, computes their canonical safeTxHash, collects
//! owner confirmations through the (untrusted) Safe Transaction Service and executes
//! the aggregated signatures on-chain once quorum is reached.

pub mod abi;
pub mod chains;
pub mod config;
pub mod crypto;
pub mod error;
pub mod evm_client;
pub mod proposal_file;
pub mod relay_client;
pub mod service;
pub mod transaction;
pub mod validation;

// Re-export commonly used types
pub use chains::{ChainEndpoints, ChainOverrides, ChainRegistry};
pub use config::Config;
pub use crypto::{LocalSigner, RecoverableSignature, SignerProvider};
pub use error::{Result, SafeError};
pub use evm_client::EvmClient;
pub use relay_client::{MultisigTransaction, RelayClient, SafeInfo};
pub use service::{
    ConfirmOutcome, ConfirmationService, ExecutionOutcome, ExecutionResult, ExecutionService,
    ExecutionSettings, PageRequest, ProposalOutcome, ProposalService, QueryService,
};
pub use transaction::{compute_hash, Account, CallLeg, FeeParams, Operation, TransactionRecord};
