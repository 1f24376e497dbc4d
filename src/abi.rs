//! EVM ABI encoding helpers
//!
//! Just enough of the Solidity ABI for the Safe calls this crate makes:
//! 32-byte word encoding, function selectors, `execTransaction`, `nonce()` and
//! `multiSend(bytes)`.

use ethereum_types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

use crate::error::{Result, SafeError};
use crate::transaction::TransactionRecord;

/// keccak256 over arbitrary bytes.
pub fn keccak256(data: &[u8]) -> H256 {
    H256::from_slice(&Keccak256::digest(data))
}

/// First four bytes of keccak256(signature).
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Address left-padded to a 32-byte word.
pub fn encode_address(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// U256 as a big-endian 32-byte word.
pub fn encode_u256(value: &U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

pub fn encode_u64(value: u64) -> [u8; 32] {
    encode_u256(&U256::from(value))
}

/// Length word followed by the bytes, right-padded to a 32-byte boundary.
fn encode_dynamic_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&encode_u64(bytes.len() as u64));
    out.extend_from_slice(bytes);
    let padding = (32 - (bytes.len() % 32)) % 32;
    out.extend(std::iter::repeat(0u8).take(padding));
}

/// Size of a dynamic `bytes` tail (length word + padded data).
fn dynamic_bytes_size(bytes: &[u8]) -> usize {
    32 + bytes.len().div_ceil(32) * 32
}

/// Calldata for `nonce()` on a Safe.
pub fn encode_nonce_call() -> Vec<u8> {
    selector("nonce()").to_vec()
}

/// Calldata for `execTransaction(...)` with the aggregated owner signatures.
pub fn encode_exec_transaction(record: &TransactionRecord, signatures: &[u8]) -> Vec<u8> {
    // 10 head words: to, value, data offset, operation, safeTxGas, baseGas,
    // gasPrice, gasToken, refundReceiver, signatures offset
    let head_size = 10 * 32;
    let data_offset = head_size;
    let signatures_offset = head_size + dynamic_bytes_size(&record.data);

    let mut out = Vec::with_capacity(4 + signatures_offset + dynamic_bytes_size(signatures));
    out.extend_from_slice(&selector(
        "execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)",
    ));
    out.extend_from_slice(&encode_address(&record.to));
    out.extend_from_slice(&encode_u256(&record.value));
    out.extend_from_slice(&encode_u64(data_offset as u64));
    out.extend_from_slice(&encode_u64(record.operation.code()));
    out.extend_from_slice(&encode_u256(&record.fees.safe_tx_gas));
    out.extend_from_slice(&encode_u256(&record.fees.base_gas));
    out.extend_from_slice(&encode_u256(&record.fees.gas_price));
    out.extend_from_slice(&encode_address(&record.fees.gas_token));
    out.extend_from_slice(&encode_address(&record.fees.refund_receiver));
    out.extend_from_slice(&encode_u64(signatures_offset as u64));
    encode_dynamic_bytes(&mut out, &record.data);
    encode_dynamic_bytes(&mut out, signatures);
    out
}

/// Calldata for `multiSend(bytes transactions)`.
pub fn encode_multi_send(packed_transactions: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + 32 + dynamic_bytes_size(packed_transactions));
    out.extend_from_slice(&selector("multiSend(bytes)"));
    out.extend_from_slice(&encode_u64(32));
    encode_dynamic_bytes(&mut out, packed_transactions);
    out
}

/// Decodes a single ABI word returned by `eth_call` into a U256.
pub fn decode_u256_word(hex_result: &str) -> Result<U256> {
    let clean = hex_result.strip_prefix("0x").unwrap_or(hex_result);
    if clean.len() != 64 {
        return Err(SafeError::malformed(
            "eth_call",
            format!("expected one 32-byte word, got {} hex chars", clean.len()),
        ));
    }
    let bytes = hex::decode(clean).map_err(|e| SafeError::malformed("eth_call", e.to_string()))?;
    Ok(U256::from_big_endian(&bytes))
}
