//! Cryptographic Operations Module
//!
//! Owner signing over safeTxHashes and EVM transaction digests (secp256k1), plus
//! signer-address recovery for checking confirmations handed back by the relay.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: Private keys must never be exposed or logged. The relay only ever
//! receives hashes and signatures. A signer's address is always derived from its own
//! key, never taken from a server response.

use ethereum_types::{Address, H256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use tracing::info;

use crate::error::{Result, SafeError};

/// Default environment variable holding the owner's private key (hex).
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "SAFE_SIGNER_PRIVATE_KEY";

// ============================================================================
// SIGNATURE TYPES
// ============================================================================

/// ECDSA signature with its recovery id (0 or 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: H256,
    pub s: H256,
    pub recovery_id: u8,
}

impl RecoverableSignature {
    /// 65-byte `r || s || v` with `v = 27 + recovery_id`, as Safe expects for EIP-712 owner signatures.
    pub fn to_safe_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(self.r.as_bytes());
        out.extend_from_slice(self.s.as_bytes());
        out.push(27 + self.recovery_id);
        out
    }

    pub fn to_safe_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_safe_bytes()))
    }
}

/// How the Safe contract interprets a 65-byte signature, keyed by its `v` byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafeSignatureKind {
    /// v = 0: EIP-1271 contract signature
    Contract,
    /// v = 1: pre-approved hash
    ApprovedHash,
    /// v = 27/28: ECDSA over the safeTxHash itself
    Eip712,
    /// v = 31/32: ECDSA over the eth_sign-prefixed safeTxHash
    EthSign,
}

impl SafeSignatureKind {
    pub fn from_v(v: u8) -> Result<Self> {
        match v {
            0 => Ok(SafeSignatureKind::Contract),
            1 => Ok(SafeSignatureKind::ApprovedHash),
            27 | 28 => Ok(SafeSignatureKind::Eip712),
            31 | 32 => Ok(SafeSignatureKind::EthSign),
            other => Err(SafeError::invalid_payload(
                "signature",
                format!("unsupported v value {}", other),
            )),
        }
    }
}

// ============================================================================
// SIGNER CAPABILITY
// ============================================================================

/// Signing capability handed to the services.
///
/// Lets tests swap in a deterministic signer without touching the process environment.
pub trait SignerProvider: Send + Sync {
    /// Address derived from the signer's own key.
    fn address(&self) -> Address;

    /// Signs a 32-byte digest as-is (no prefixing, no re-hashing).
    fn sign_digest(&self, digest: &H256) -> Result<RecoverableSignature>;
}

/// In-process secp256k1 signer.
pub struct LocalSigner {
    signing_key: SigningKey,
    address: Address,
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl LocalSigner {
    /// Creates a signer from raw 32 secret-key bytes.
    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        if secret.len() != 32 {
            return Err(SafeError::MissingCredential(format!(
                "private key must be 32 bytes, got {}",
                secret.len()
            )));
        }
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|e| SafeError::MissingCredential(format!("invalid private key: {}", e)))?;
        let address = address_from_verifying_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// Creates a signer from a hex private key (`0x` prefix optional).
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let trimmed = private_key.trim();
        let clean = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(clean)
            .map_err(|_| SafeError::MissingCredential("private key is not valid hex".to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Loads the private key from an environment variable.
    ///
    /// # Arguments
    ///
    /// * `env_var` - Name of the variable (e.g. `SAFE_SIGNER_PRIVATE_KEY`)
    pub fn from_env(env_var: &str) -> Result<Self> {
        let value = std::env::var(env_var).map_err(|_| {
            SafeError::MissingCredential(format!(
                "environment variable '{}' not set; export the owner's hex private key",
                env_var
            ))
        })?;
        let signer = Self::from_hex(&value)?;
        info!("Loaded signer {:?} from environment variable {}", signer.address, env_var);
        Ok(signer)
    }
}

impl SignerProvider for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_digest(&self, digest: &H256) -> Result<RecoverableSignature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| SafeError::Signing(e.to_string()))?;

        let bytes = signature.to_bytes();
        Ok(RecoverableSignature {
            r: H256::from_slice(&bytes[..32]),
            s: H256::from_slice(&bytes[32..64]),
            recovery_id: recovery_id.to_byte(),
        })
    }
}

// ============================================================================
// RECOVERY
// ============================================================================

/// Ethereum address of a public key: keccak256(x || y)[12..32].
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Uncompressed point: 0x04 || x || y
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..32])
}

/// keccak256("\x19Ethereum Signed Message:\n32" || hash)
pub fn eth_signed_message_hash(hash: &H256) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.as_bytes());
    H256::from_slice(&hasher.finalize())
}

/// Recovers the signer address of a digest signature.
pub fn recover_address(digest: &H256, r: &[u8], s: &[u8], recovery_id: u8) -> Result<Address> {
    let mut rs = [0u8; 64];
    rs[..32].copy_from_slice(r);
    rs[32..].copy_from_slice(s);
    let mut signature = EcdsaSignature::from_slice(&rs)
        .map_err(|e| SafeError::invalid_payload("signature", e.to_string()))?;
    let mut recovery_id = RecoveryId::from_byte(recovery_id)
        .ok_or_else(|| SafeError::invalid_payload("signature", "recovery id must be 0 or 1"))?;

    if let Some(normalized) = signature.normalize_s() {
        signature = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &signature, recovery_id)
        .map_err(|e| SafeError::invalid_payload("signature", e.to_string()))?;
    Ok(address_from_verifying_key(&key))
}

/// Recovers the owner behind a 65-byte Safe signature over `safe_tx_hash`.
///
/// # Returns
///
/// * `Ok(Some(address))` - ECDSA signature (EIP-712 or eth_sign style)
/// * `Ok(None)` - Contract or approved-hash signature; only the contract can judge it
/// * `Err(SafeError::InvalidPayload)` - Wrong length, bad `v` or unrecoverable
pub fn recover_safe_signer(safe_tx_hash: &H256, signature: &[u8]) -> Result<Option<Address>> {
    if signature.len() != 65 {
        return Err(SafeError::invalid_payload(
            "signature",
            format!("expected 65 bytes, got {}", signature.len()),
        ));
    }

    let v = signature[64];
    let (r, s) = (&signature[..32], &signature[32..64]);
    match SafeSignatureKind::from_v(v)? {
        SafeSignatureKind::Contract | SafeSignatureKind::ApprovedHash => Ok(None),
        SafeSignatureKind::Eip712 => recover_address(safe_tx_hash, r, s, v - 27).map(Some),
        SafeSignatureKind::EthSign => {
            let prefixed = eth_signed_message_hash(safe_tx_hash);
            recover_address(&prefixed, r, s, v - 31).map(Some)
        }
    }
}
