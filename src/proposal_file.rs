//! Proposal file parsing
//!
//! A proposal file describes one or more call legs to run as a single Safe
//! transaction:
//!
//! ```json
//! {
//!   "transactions": [
//!     { "to": "0x...", "value": "0", "data": "0x...", "operation": 0 }
//!   ],
//!   "nonce": 7
//! }
//! ```
//!
//! Unknown fields are rejected. Every address and hex payload is validated before
//! anything touches the network.

use std::path::Path;

use ethereum_types::U256;
use serde::Deserialize;

use crate::error::{Result, SafeError};
use crate::relay_client::NumberOrString;
use crate::transaction::{CallLeg, Operation};
use crate::validation::{parse_hex_bytes, validate_address};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalFile {
    pub transactions: Vec<ProposalLeg>,
    #[serde(default)]
    pub nonce: Option<NumberOrString>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProposalLeg {
    pub to: String,
    #[serde(default)]
    pub value: Option<NumberOrString>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub operation: Option<u64>,
}

/// Validated proposal: typed legs plus the optional explicit nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRequest {
    pub legs: Vec<CallLeg>,
    pub nonce: Option<U256>,
}

impl ProposalLeg {
    fn to_call_leg(&self, index: usize) -> Result<CallLeg> {
        let to = validate_address(&self.to, &format!("transactions[{}].to", index))?;
        let value = match &self.value {
            None => U256::zero(),
            Some(v) => v
                .to_u256("value")
                .map_err(|e| SafeError::invalid_payload(&format!("transactions[{}].value", index), e.to_string()))?,
        };
        let data = match self.data.as_deref() {
            None => Vec::new(),
            Some(d) => parse_hex_bytes(d, &format!("transactions[{}].data", index))?,
        };
        let operation = Operation::from_code(self.operation.unwrap_or(0))?;
        Ok(CallLeg {
            to,
            value,
            data,
            operation,
        })
    }
}

impl ProposalFile {
    pub fn validate(&self) -> Result<ProposalRequest> {
        if self.transactions.is_empty() {
            return Err(SafeError::invalid_payload(
                "transactions",
                "proposal file lists no transactions",
            ));
        }
        let legs = self
            .transactions
            .iter()
            .enumerate()
            .map(|(i, leg)| leg.to_call_leg(i))
            .collect::<Result<Vec<_>>>()?;
        let nonce = match &self.nonce {
            None => None,
            Some(n) => Some(
                n.to_u256("nonce")
                    .map_err(|e| SafeError::invalid_payload("nonce", e.to_string()))?,
            ),
        };
        Ok(ProposalRequest { legs, nonce })
    }
}

/// Builds a one-leg proposal from individual CLI values.
pub fn single_leg(to: &str, value: &str, data: &str, operation: u64) -> Result<ProposalRequest> {
    let leg = ProposalLeg {
        to: to.to_string(),
        value: Some(NumberOrString::Text(value.to_string())),
        data: Some(data.to_string()),
        operation: Some(operation),
    };
    Ok(ProposalRequest {
        legs: vec![leg.to_call_leg(0)?],
        nonce: None,
    })
}

/// Parses and validates proposal JSON.
pub fn from_json_str(content: &str) -> Result<ProposalRequest> {
    let file: ProposalFile =
        serde_json::from_str(content).map_err(|e| SafeError::invalid_payload("proposal file", e.to_string()))?;
    file.validate()
}

/// Reads, parses and validates a proposal file from disk.
pub fn from_file(path: impl AsRef<Path>) -> Result<ProposalRequest> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        SafeError::invalid_payload("proposal file", format!("cannot read '{}': {}", path.display(), e))
    })?;
    from_json_str(&content)
}
