//! Input validation
//!
//! Pure checks run before any network or signing work. Every function here is
//! side-effect free except `warn_if_no_credential`, which only logs.

use std::collections::HashSet;

use ethereum_types::{Address, H256};
use sha3::{Digest, Keccak256};
use tracing::warn;

use crate::chains::ChainEndpoints;
use crate::error::{Result, SafeError};

// ============================================================================
// ADDRESSES
// ============================================================================

/// Validates a 20-byte hex address.
///
/// All-lowercase and all-uppercase forms are accepted as-is; a mixed-case value must
/// match its EIP-55 checksum exactly.
///
/// # Arguments
///
/// * `value` - Address string, `0x`-prefixed
/// * `label` - What the address is (used in the error message)
pub fn validate_address(value: &str, label: &str) -> Result<Address> {
    let err = || SafeError::invalid_address(label, value);

    let hex_part = value.strip_prefix("0x").ok_or_else(err)?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(err());
    }

    let bytes = hex::decode(hex_part).map_err(|_| err())?;
    let address = Address::from_slice(&bytes);

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && to_checksum_address(&address) != value {
        return Err(err());
    }

    Ok(address)
}

/// Formats an address with its EIP-55 mixed-case checksum.
pub fn to_checksum_address(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// HASHES AND HEX PAYLOADS
// ============================================================================

/// Validates a `0x`-prefixed 32-byte hex value (e.g. a safeTxHash).
pub fn validate_hash(value: &str, label: &str) -> Result<H256> {
    let err = || SafeError::invalid_hash(label, value);

    let hex_part = value.strip_prefix("0x").ok_or_else(err)?;
    if hex_part.len() != 64 {
        return Err(err());
    }
    let bytes = hex::decode(hex_part).map_err(|_| err())?;
    Ok(H256::from_slice(&bytes))
}

/// Parses `0x`-prefixed hex bytes. `"0x"` and `""` decode to no bytes.
pub fn parse_hex_bytes(value: &str, label: &str) -> Result<Vec<u8>> {
    if value.is_empty() {
        return Ok(Vec::new());
    }
    let hex_part = value
        .strip_prefix("0x")
        .ok_or_else(|| SafeError::invalid_payload(label, "missing 0x prefix"))?;
    if hex_part.len() % 2 != 0 {
        return Err(SafeError::invalid_payload(label, "odd number of hex digits"));
    }
    hex::decode(hex_part).map_err(|e| SafeError::invalid_payload(label, e.to_string()))
}

// ============================================================================
// OWNERS AND THRESHOLD
// ============================================================================

/// Checks 1 <= threshold <= |owners| with non-empty, pairwise-distinct owners.
pub fn validate_threshold(owners: &[Address], threshold: u64) -> Result<()> {
    if owners.is_empty() {
        return Err(SafeError::InvalidThreshold("owner list is empty".to_string()));
    }

    let mut seen = HashSet::with_capacity(owners.len());
    for owner in owners {
        if !seen.insert(*owner) {
            return Err(SafeError::InvalidThreshold(format!(
                "duplicate owner {}",
                to_checksum_address(owner)
            )));
        }
    }

    if threshold < 1 || threshold > owners.len() as u64 {
        return Err(SafeError::InvalidThreshold(format!(
            "threshold {} outside 1..={}",
            threshold,
            owners.len()
        )));
    }

    Ok(())
}

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Warns when talking to the hosted relay without an API key.
///
/// Never fails: anonymous traffic still works but may be rate limited. Custom
/// (self-hosted) relays are accepted silently.
///
/// # Returns
///
/// `true` if a warning was emitted.
pub fn warn_if_no_credential(endpoints: &ChainEndpoints, api_key_present: bool) -> bool {
    if api_key_present || !endpoints.is_public_relay() {
        return false;
    }
    warn!(
        "WARNING: no API key configured for hosted transaction service {}; requests may be rate limited",
        endpoints.relay_base_url
    );
    true
}
