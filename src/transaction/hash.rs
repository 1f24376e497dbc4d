//! safeTxHash computation (EIP-712)
//!
//! This is the only hashing implementation in the crate. Proposal, confirmation and
//! execution all call `compute_hash`, so a divergence between them is impossible by
//! construction.

use ethereum_types::{Address, H256};

use crate::abi::{encode_address, encode_u256, encode_u64, keccak256};
use crate::transaction::TransactionRecord;

/// EIP-712 domain type used by Safe >= 1.3.0.
pub const DOMAIN_SEPARATOR_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";

/// EIP-712 struct type of a Safe transaction.
pub const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// keccak256(abi.encode(DOMAIN_TYPEHASH, chainId, safe))
pub fn domain_separator(safe: &Address, chain_id: u64) -> H256 {
    let mut encoded = Vec::with_capacity(3 * 32);
    encoded.extend_from_slice(keccak256(DOMAIN_SEPARATOR_TYPE.as_bytes()).as_bytes());
    encoded.extend_from_slice(&encode_u64(chain_id));
    encoded.extend_from_slice(&encode_address(safe));
    keccak256(&encoded)
}

/// keccak256(abi.encode(SAFE_TX_TYPEHASH, to, value, keccak256(data), operation, ...))
pub fn safe_tx_struct_hash(record: &TransactionRecord) -> H256 {
    let mut encoded = Vec::with_capacity(11 * 32);
    encoded.extend_from_slice(keccak256(SAFE_TX_TYPE.as_bytes()).as_bytes());
    encoded.extend_from_slice(&encode_address(&record.to));
    encoded.extend_from_slice(&encode_u256(&record.value));
    encoded.extend_from_slice(keccak256(&record.data).as_bytes());
    encoded.extend_from_slice(&encode_u64(record.operation.code()));
    encoded.extend_from_slice(&encode_u256(&record.fees.safe_tx_gas));
    encoded.extend_from_slice(&encode_u256(&record.fees.base_gas));
    encoded.extend_from_slice(&encode_u256(&record.fees.gas_price));
    encoded.extend_from_slice(&encode_address(&record.fees.gas_token));
    encoded.extend_from_slice(&encode_address(&record.fees.refund_receiver));
    encoded.extend_from_slice(&encode_u256(&record.nonce));
    keccak256(&encoded)
}

/// Computes the safeTxHash binding a record to one Safe on one chain.
///
/// Pure and deterministic: identical inputs always give identical bytes, and any
/// single-field change gives a different hash.
pub fn compute_hash(record: &TransactionRecord, safe: &Address, chain_id: u64) -> H256 {
    let mut preimage = Vec::with_capacity(2 + 32 + 32);
    preimage.push(0x19);
    preimage.push(0x01);
    preimage.extend_from_slice(domain_separator(safe, chain_id).as_bytes());
    preimage.extend_from_slice(safe_tx_struct_hash(record).as_bytes());
    keccak256(&preimage)
}
