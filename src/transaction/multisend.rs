//! Multi-leg batching through MultiSendCallOnly
//!
//! Several call legs become one Safe transaction: a DELEGATECALL into
//! `MultiSendCallOnly.multiSend(bytes)` whose argument is the packed legs.
//! A single leg is passed through untouched.

use ethereum_types::{Address, U256};

use crate::abi::{encode_multi_send, encode_u256};
use crate::error::{Result, SafeError};
use crate::transaction::{CallLeg, Operation};

/// Canonical MultiSendCallOnly 1.3.0 deployment (same address on every supported chain).
pub const DEFAULT_MULTISEND_CALL_ONLY: &str = "0x40a2accbd92bca938b02010e17a5b8929b49130d";

/// Packs legs as `operation(uint8) || to(address) || value(uint256) || len(uint256) || data`.
pub fn pack_multi_send(legs: &[CallLeg]) -> Vec<u8> {
    let mut packed = Vec::new();
    for leg in legs {
        packed.push(leg.operation.code() as u8);
        packed.extend_from_slice(leg.to.as_bytes());
        packed.extend_from_slice(&encode_u256(&leg.value));
        packed.extend_from_slice(&encode_u256(&U256::from(leg.data.len())));
        packed.extend_from_slice(&leg.data);
    }
    packed
}

/// Combines legs into the single leg the Safe executes.
///
/// # Returns
///
/// * `Ok(CallLeg)` - The only leg, or a delegatecall into MultiSendCallOnly
/// * `Err(SafeError::InvalidPayload)` - No legs, or a batched leg is a delegatecall
pub fn assemble_legs(mut legs: Vec<CallLeg>, multisend_call_only: &Address) -> Result<CallLeg> {
    if legs.is_empty() {
        return Err(SafeError::invalid_payload(
            "transactions",
            "at least one call leg is required",
        ));
    }

    if legs.len() == 1 {
        if let Some(only) = legs.pop() {
            return Ok(only);
        }
    }

    if let Some(index) = legs.iter().position(|l| l.operation != Operation::Call) {
        return Err(SafeError::invalid_payload(
            "transactions",
            format!("leg {} is a delegatecall; MultiSendCallOnly only batches calls", index),
        ));
    }

    Ok(CallLeg {
        to: *multisend_call_only,
        value: U256::zero(),
        data: encode_multi_send(&pack_multi_send(&legs)),
        operation: Operation::DelegateCall,
    })
}
