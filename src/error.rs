//! Error types for the quorum coordination engine.
//!
//! Local validation failures (`Invalid*`, `UnknownChain`) are always raised before any
//! network call. `Integrity` is never downgraded: it aborts the whole execution path.

use ethereum_types::{Address, H256};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SafeError>;

#[derive(Error, Debug)]
pub enum SafeError {
    #[error("Invalid {label} address: '{value}'")]
    InvalidAddress { label: String, value: String },

    #[error("Invalid {label}: '{value}' (expected 0x-prefixed 32-byte hex)")]
    InvalidHash { label: String, value: String },

    #[error("Invalid owners/threshold: {0}")]
    InvalidThreshold(String),

    #[error("Invalid call type {0} (expected 0 = call or 1 = delegatecall)")]
    InvalidCallType(u64),

    #[error("Invalid {label}: {reason}")]
    InvalidPayload { label: String, reason: String },

    #[error("Unknown chain slug '{0}' (pass an explicit override or use a known chain)")]
    UnknownChain(String),

    #[error("Signer {signer:?} is not an owner of Safe {safe:?}")]
    NotOwner { signer: Address, safe: Address },

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Network error calling {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    #[error("Protocol error (HTTP {status}): {body}")]
    Protocol { status: u16, body: String },

    /// Detected locally before submitting; the contract would reject the same
    /// signatures on-chain (GS020).
    #[error("Below threshold: {have} valid confirmation(s), {need} required")]
    BelowThreshold { have: usize, need: usize },

    #[error("Malformed response from {context}: {reason}")]
    MalformedResponse { context: String, reason: String },

    #[error("Integrity check failed: expected safeTxHash {expected:?}, relay data hashes to {computed:?}")]
    Integrity { expected: H256, computed: H256 },

    #[error("Signing failed: {0}")]
    Signing(String),
}

impl SafeError {
    pub fn invalid_address(label: &str, value: &str) -> Self {
        SafeError::InvalidAddress {
            label: label.to_string(),
            value: value.to_string(),
        }
    }

    pub fn invalid_hash(label: &str, value: &str) -> Self {
        SafeError::InvalidHash {
            label: label.to_string(),
            value: value.to_string(),
        }
    }

    pub fn invalid_payload(label: &str, reason: impl Into<String>) -> Self {
        SafeError::InvalidPayload {
            label: label.to_string(),
            reason: reason.into(),
        }
    }

    pub fn malformed(context: &str, reason: impl Into<String>) -> Self {
        SafeError::MalformedResponse {
            context: context.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Nothing in this crate retries on its own; callers use this to pick a policy.
    /// Every mutating operation is idempotent or re-checked, so retrying these is safe.
    pub fn is_retryable(&self) -> bool {
        match self {
            SafeError::Network { .. } => true,
            SafeError::Protocol { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// True for errors detected locally before any network traffic.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            SafeError::InvalidAddress { .. }
                | SafeError::InvalidHash { .. }
                | SafeError::InvalidThreshold(_)
                | SafeError::InvalidCallType(_)
                | SafeError::InvalidPayload { .. }
                | SafeError::UnknownChain(_)
                | SafeError::MissingCredential(_)
        )
    }
}
