//! Transaction Builder
//!
//! Canonical Safe transaction record plus the helpers that assemble it from one or
//! more call legs. A record is immutable once hashed: changing any field yields a
//! different safeTxHash and therefore a different transaction.

pub mod hash;
pub mod multisend;

use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SafeError};
use crate::validation::validate_threshold;

pub use hash::{compute_hash, domain_separator, safe_tx_struct_hash, DOMAIN_SEPARATOR_TYPE, SAFE_TX_TYPE};
pub use multisend::{assemble_legs, pack_multi_send, DEFAULT_MULTISEND_CALL_ONLY};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Safe call type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Operation {
    /// Regular CALL (0)
    Call,
    /// DELEGATECALL (1)
    DelegateCall,
}

impl Operation {
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            other => Err(SafeError::InvalidCallType(other)),
        }
    }

    pub fn code(&self) -> u64 {
        match self {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = SafeError;

    fn try_from(code: u8) -> Result<Self> {
        Operation::from_code(code as u64)
    }
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> u8 {
        op.code() as u8
    }
}

/// Fee-shaping parameters of a Safe transaction.
///
/// All zero for the common "executor pays gas, no refund" case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
}

/// One call the Safe should perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLeg {
    pub to: Address,
    pub value: U256,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub operation: Operation,
}

/// Canonical transaction record bound to one Safe nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub to: Address,
    pub value: U256,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
    pub operation: Operation,
    pub fees: FeeParams,
    pub nonce: U256,
}

/// A Safe account as reported by the relay, validated at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub address: Address,
    /// Owners in the order the contract reports them
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub nonce: U256,
    pub chain_id: u64,
}

impl Account {
    /// Creates an account after checking the owner/threshold invariant.
    pub fn new(
        address: Address,
        owners: Vec<Address>,
        threshold: u64,
        nonce: U256,
        chain_id: u64,
    ) -> Result<Self> {
        validate_threshold(&owners, threshold)?;
        Ok(Self {
            address,
            owners,
            threshold,
            nonce,
            chain_id,
        })
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Builds a transaction record.
///
/// # Arguments
///
/// * `to` - Call target
/// * `data` - Call payload
/// * `value` - Native value in wei
/// * `operation_code` - 0 = call, 1 = delegatecall
/// * `fees` - Fee-shaping parameters
/// * `nonce` - Safe nonce the record is bound to
///
/// # Returns
///
/// * `Ok(TransactionRecord)` - Record ready for hashing
/// * `Err(SafeError::InvalidCallType)` - `operation_code` outside {0, 1}
pub fn build_record(
    to: Address,
    data: Vec<u8>,
    value: U256,
    operation_code: u64,
    fees: FeeParams,
    nonce: U256,
) -> Result<TransactionRecord> {
    let operation = Operation::from_code(operation_code)?;
    Ok(TransactionRecord {
        to,
        value,
        data,
        operation,
        fees,
        nonce,
    })
}

/// Builds a record from an already-assembled call leg.
pub fn build_record_from_leg(leg: CallLeg, fees: FeeParams, nonce: U256) -> TransactionRecord {
    TransactionRecord {
        to: leg.to,
        value: leg.value,
        data: leg.data,
        operation: leg.operation,
        fees,
        nonce,
    }
}

/// Serde adapter for `0x`-prefixed hex byte strings.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let clean = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(clean).map_err(serde::de::Error::custom)
    }
}
