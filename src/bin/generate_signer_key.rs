//! secp256k1 Key Generation Utility
//!
//! Generates a fresh owner/executor key and prints it with its Ethereum address.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin generate_signer_key
//! ```
//!
//! Export the printed private key as `SAFE_SIGNER_PRIVATE_KEY` (or the variable named
//! in `[signer] private_key_env`). Add the address as an owner of the Safe.

use rand::Rng;
use safe_quorum::crypto::{LocalSigner, SignerProvider, DEFAULT_PRIVATE_KEY_ENV};
use safe_quorum::validation::to_checksum_address;

fn main() -> anyhow::Result<()> {
    let mut rng = rand::rngs::OsRng;
    let mut secret = [0u8; 32];
    // Out-of-range scalars (zero or >= group order) are rejected; draw again
    let signer = loop {
        rng.fill(&mut secret);
        if let Ok(signer) = LocalSigner::from_bytes(&secret) {
            break signer;
        }
    };

    println!("Generated secp256k1 key:");
    println!();
    println!("{}=0x{}", DEFAULT_PRIVATE_KEY_ENV, hex::encode(secret));
    println!("SAFE_SIGNER_ADDRESS={}", to_checksum_address(&signer.address()));
    println!();
    println!("Keep the private key secret. Only the address belongs in Safe owner lists.");
    Ok(())
}
