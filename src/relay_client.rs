//! Relay (Safe Transaction Service) Client
//!
//! Async HTTP client for the off-chain coordination service. The relay is untrusted:
//! every payload is decoded into typed structs and the fields the protocol relies on
//! are validated here before anything downstream sees them.
//!
//! One client instance carries the single timeout policy and the optional credential
//! for all services. There are no retries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ethereum_types::{Address, H256, U256};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Result, SafeError};
use crate::transaction::{build_record, Account, FeeParams, TransactionRecord};
use crate::validation::{parse_hex_bytes, to_checksum_address, validate_address, validate_hash};

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Numeric fields arrive as JSON numbers or decimal strings depending on service version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    pub fn to_u256(&self, label: &str) -> Result<U256> {
        match self {
            NumberOrString::Number(n) => Ok(U256::from(*n)),
            NumberOrString::Text(s) => U256::from_dec_str(s.trim())
                .map_err(|_| SafeError::malformed(label, format!("'{}' is not a decimal integer", s))),
        }
    }

    pub fn to_u64(&self, label: &str) -> Result<u64> {
        let value = self.to_u256(label)?;
        if value > U256::from(u64::MAX) {
            return Err(SafeError::malformed(label, format!("{} does not fit in u64", value)));
        }
        Ok(value.low_u64())
    }
}

/// `GET /v1/safes/{address}/`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeInfo {
    pub address: String,
    pub nonce: NumberOrString,
    pub threshold: NumberOrString,
    pub owners: Vec<String>,
    #[serde(default)]
    pub master_copy: Option<String>,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub fallback_handler: Option<String>,
    #[serde(default)]
    pub guard: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl SafeInfo {
    /// Validates the relay's account metadata and converts it to an `Account`.
    ///
    /// Rejects malformed owner addresses and inconsistent owner/threshold pairs.
    pub fn to_account(&self, chain_id: u64) -> Result<Account> {
        let address = validate_address(&self.address, "safe")
            .map_err(|_| SafeError::malformed("safe info", format!("bad address '{}'", self.address)))?;
        let owners = self
            .owners
            .iter()
            .map(|o| {
                validate_address(o, "owner")
                    .map_err(|_| SafeError::malformed("safe info", format!("bad owner '{}'", o)))
            })
            .collect::<Result<Vec<_>>>()?;
        let threshold = self.threshold.to_u64("safe info threshold")?;
        let nonce = self.nonce.to_u256("safe info nonce")?;
        Account::new(address, owners, threshold, nonce, chain_id)
    }
}

/// One owner signature attached to a pending transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub owner: String,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub signature_type: Option<String>,
}

/// Confirmation whose owner and signature bytes decoded cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfirmation {
    pub owner: Address,
    pub signature: Vec<u8>,
}

/// Pending transaction bundle: the relay's view of a record plus its confirmations.
///
/// Untrusted data *about* a transaction. Nothing may act on it without rebuilding the
/// record and recomputing the hash locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultisigTransaction {
    pub safe: String,
    pub to: String,
    pub value: NumberOrString,
    #[serde(default)]
    pub data: Option<String>,
    pub operation: u64,
    #[serde(default)]
    pub gas_token: Option<String>,
    pub safe_tx_gas: NumberOrString,
    pub base_gas: NumberOrString,
    pub gas_price: NumberOrString,
    #[serde(default)]
    pub refund_receiver: Option<String>,
    pub nonce: NumberOrString,
    pub safe_tx_hash: String,
    #[serde(default)]
    pub is_executed: bool,
    #[serde(default)]
    pub is_successful: Option<bool>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub executor: Option<String>,
    #[serde(default)]
    pub proposer: Option<String>,
    #[serde(default)]
    pub submission_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub confirmations_required: Option<u64>,
    #[serde(default)]
    pub confirmations: Option<Vec<Confirmation>>,
}

fn optional_address(value: &Option<String>, label: &str) -> Result<Address> {
    match value.as_deref() {
        None | Some("") => Ok(Address::zero()),
        Some(v) => validate_address(v, label)
            .map_err(|_| SafeError::malformed("transaction bundle", format!("bad {} '{}'", label, v))),
    }
}

impl MultisigTransaction {
    /// Rebuilds the transaction record from the bundle fields with the shared builder.
    pub fn to_record(&self) -> Result<TransactionRecord> {
        let context = "transaction bundle";
        let to = validate_address(&self.to, "to")
            .map_err(|_| SafeError::malformed(context, format!("bad to '{}'", self.to)))?;
        let data = match self.data.as_deref() {
            None => Vec::new(),
            Some(d) => parse_hex_bytes(d, "data").map_err(|e| SafeError::malformed(context, e.to_string()))?,
        };
        let fees = FeeParams {
            safe_tx_gas: self.safe_tx_gas.to_u256("safeTxGas")?,
            base_gas: self.base_gas.to_u256("baseGas")?,
            gas_price: self.gas_price.to_u256("gasPrice")?,
            gas_token: optional_address(&self.gas_token, "gasToken")?,
            refund_receiver: optional_address(&self.refund_receiver, "refundReceiver")?,
        };
        build_record(
            to,
            data,
            self.value.to_u256("value")?,
            self.operation,
            fees,
            self.nonce.to_u256("nonce")?,
        )
    }

    /// The hash label the relay filed this bundle under.
    pub fn claimed_hash(&self) -> Result<H256> {
        validate_hash(&self.safe_tx_hash, "safeTxHash")
            .map_err(|_| SafeError::malformed("transaction bundle", format!("bad safeTxHash '{}'", self.safe_tx_hash)))
    }

    pub fn safe_address(&self) -> Result<Address> {
        validate_address(&self.safe, "safe")
            .map_err(|_| SafeError::malformed("transaction bundle", format!("bad safe '{}'", self.safe)))
    }

    /// On-chain transaction hash of the execution, when reported.
    pub fn executed_transaction_hash(&self) -> Option<H256> {
        self.transaction_hash
            .as_deref()
            .and_then(|h| validate_hash(h, "transactionHash").ok())
    }

    /// Confirmations that decode cleanly; malformed entries are dropped.
    pub fn parsed_confirmations(&self) -> Vec<ParsedConfirmation> {
        self.confirmations
            .iter()
            .flatten()
            .filter_map(|c| {
                let owner = validate_address(&c.owner, "owner").ok()?;
                let signature = parse_hex_bytes(c.signature.as_deref()?, "signature").ok()?;
                Some(ParsedConfirmation { owner, signature })
            })
            .collect()
    }

    /// Whether `owner` already has a confirmation on this bundle.
    pub fn is_confirmed_by(&self, owner: &Address) -> bool {
        self.confirmations
            .iter()
            .flatten()
            .filter_map(|c| validate_address(&c.owner, "owner").ok())
            .any(|a| a == *owner)
    }

    /// Number of distinct current owners with a confirmation.
    ///
    /// Duplicate entries for one owner count once; non-owners are ignored.
    pub fn confirmation_count(&self, owners: &[Address]) -> usize {
        let mut counted: Vec<Address> = Vec::new();
        for c in self.confirmations.iter().flatten() {
            if let Ok(owner) = validate_address(&c.owner, "owner") {
                if owners.contains(&owner) && !counted.contains(&owner) {
                    counted.push(owner);
                }
            }
        }
        counted.len()
    }
}

/// Paginated list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Body of `POST /v1/safes/{address}/multisig-transactions/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposeRequest {
    pub to: String,
    pub value: String,
    pub data: Option<String>,
    pub operation: u64,
    pub safe_tx_gas: String,
    pub base_gas: String,
    pub gas_price: String,
    pub gas_token: String,
    pub refund_receiver: String,
    pub nonce: String,
    pub contract_transaction_hash: String,
    pub sender: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ProposeRequest {
    pub fn new(
        record: &TransactionRecord,
        safe_tx_hash: &H256,
        sender: &Address,
        signature_hex: String,
        origin: Option<String>,
    ) -> Self {
        Self {
            to: to_checksum_address(&record.to),
            value: record.value.to_string(),
            data: if record.data.is_empty() {
                None
            } else {
                Some(format!("0x{}", hex::encode(&record.data)))
            },
            operation: record.operation.code(),
            safe_tx_gas: record.fees.safe_tx_gas.to_string(),
            base_gas: record.fees.base_gas.to_string(),
            gas_price: record.fees.gas_price.to_string(),
            gas_token: to_checksum_address(&record.fees.gas_token),
            refund_receiver: to_checksum_address(&record.fees.refund_receiver),
            nonce: record.nonce.to_string(),
            contract_transaction_hash: format!("{:#x}", safe_tx_hash),
            sender: to_checksum_address(sender),
            signature: signature_hex,
            origin,
        }
    }
}

/// Body of `POST /v1/multisig-transactions/{hash}/confirmations/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub signature: String,
}

/// Result of an ensure-present confirmation submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationSubmission {
    Created,
    AlreadyPresent,
}

// ============================================================================
// CLIENT
// ============================================================================

/// HTTP client for the Safe Transaction Service.
pub struct RelayClient {
    /// HTTP client instance
    client: Client,
    /// Service base URL, e.g. "https://api.safe.global/tx-service/base/api"
    base_url: String,
    /// Optional access credential (sent as a bearer token, never logged)
    api_key: Option<String>,
    /// Per-request deadline
    timeout: Duration,
}

impl RelayClient {
    /// Creates a new relay client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Transaction service base URL (trailing slash tolerated)
    /// * `api_key` - Optional access credential
    /// * `timeout` - Deadline applied to every request
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        parse_endpoint(&base_url, "relay url")?;
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy() // Avoid macOS system-configuration issues in tests
            .build()
            .map_err(|e| SafeError::Network {
                endpoint: base_url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fetches owners, threshold and nonce of a Safe.
    pub async fn get_safe_info(&self, safe: &Address) -> Result<SafeInfo> {
        let path = format!("/v1/safes/{}/", to_checksum_address(safe));
        self.get_json(&path).await
    }

    /// Lists unexecuted transactions of a Safe, one page at a time.
    pub async fn list_pending(&self, safe: &Address, limit: u32, offset: u32) -> Result<Page<MultisigTransaction>> {
        let path = format!(
            "/v1/safes/{}/multisig-transactions/?executed=false&limit={}&offset={}",
            to_checksum_address(safe),
            limit,
            offset
        );
        self.get_json(&path).await
    }

    /// Fetches the full bundle filed under a safeTxHash.
    pub async fn get_transaction(&self, safe_tx_hash: &H256) -> Result<MultisigTransaction> {
        let path = format!("/v1/multisig-transactions/{:#x}/", safe_tx_hash);
        self.get_json(&path).await
    }

    /// Publishes a new proposal with the proposer's confirmation.
    pub async fn propose_transaction(&self, safe: &Address, request: &ProposeRequest) -> Result<()> {
        let path = format!("/v1/safes/{}/multisig-transactions/", to_checksum_address(safe));
        let (status, body) = self.post_json(&path, request).await?;
        if !status.is_success() {
            return Err(SafeError::Protocol {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Adds an owner signature to a pending transaction.
    ///
    /// Ensure-present semantics: if the relay reports the signature as already stored
    /// this returns `AlreadyPresent` rather than an error.
    pub async fn submit_confirmation(&self, safe_tx_hash: &H256, signature_hex: &str) -> Result<ConfirmationSubmission> {
        let path = format!("/v1/multisig-transactions/{:#x}/confirmations/", safe_tx_hash);
        let request = ConfirmationRequest {
            signature: signature_hex.to_string(),
        };
        let (status, body) = self.post_json(&path, &request).await?;

        if status.is_success() {
            return Ok(ConfirmationSubmission::Created);
        }
        if is_duplicate_confirmation(status, &body) {
            debug!("Relay already holds this confirmation for {:#x}", safe_tx_hash);
            return Ok(ConfirmationSubmission::AlreadyPresent);
        }
        Err(SafeError::Protocol {
            status: status.as_u16(),
            body,
        })
    }

    // ------------------------------------------------------------------------
    // transport helpers
    // ------------------------------------------------------------------------

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let builder = self.request(self.client.get(&url));
        let (status, body) = self.send(&url, builder).await?;
        if !status.is_success() {
            return Err(SafeError::Protocol {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| SafeError::malformed(&url, e.to_string()))
    }

    async fn post_json<B: Serialize>(&self, path: &str, payload: &B) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let builder = self.request(self.client.post(&url).json(payload));
        self.send(&url, builder).await
    }

    async fn send(&self, url: &str, builder: reqwest::RequestBuilder) -> Result<(StatusCode, String)> {
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Err(_) => Err(SafeError::Network {
                endpoint: url.to_string(),
                reason: format!("timed out after {}ms", self.timeout.as_millis()),
            }),
            Ok(Err(e)) => Err(SafeError::Network {
                endpoint: url.to_string(),
                reason: e.to_string(),
            }),
            Ok(Ok((status, body))) => {
                debug!("{} -> HTTP {}", url, status.as_u16());
                Ok((status, body))
            }
        }
    }
}

/// Checks that an endpoint is an absolute http(s) URL.
pub(crate) fn parse_endpoint(value: &str, label: &str) -> Result<Url> {
    let url = Url::parse(value).map_err(|e| SafeError::invalid_payload(label, format!("'{}': {}", value, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SafeError::invalid_payload(
            label,
            format!("unsupported scheme '{}' in '{}'", other, value),
        )),
    }
}

fn is_duplicate_confirmation(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::CONFLICT {
        return true;
    }
    status == StatusCode::BAD_REQUEST && body.to_lowercase().contains("already exists")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_or_string() {
        assert_eq!(NumberOrString::Number(5).to_u64("n").unwrap(), 5);
        assert_eq!(NumberOrString::Text("12".to_string()).to_u256("n").unwrap(), U256::from(12));
        assert!(NumberOrString::Text("0x12".to_string()).to_u256("n").is_err());
        assert!(NumberOrString::Text(U256::MAX.to_string()).to_u64("n").is_err());
    }

    #[test]
    fn test_duplicate_confirmation_detection() {
        assert!(is_duplicate_confirmation(StatusCode::CONFLICT, ""));
        assert!(is_duplicate_confirmation(
            StatusCode::BAD_REQUEST,
            "{\"signature\":[\"Signature for owner already exists\"]}"
        ));
        assert!(!is_duplicate_confirmation(StatusCode::BAD_REQUEST, "invalid signature"));
    }

    #[test]
    fn test_parse_endpoint() {
        assert!(parse_endpoint("https://api.safe.global/tx-service/sep/api", "relay url").is_ok());
        assert!(parse_endpoint("http://127.0.0.1:8545", "rpc url").is_ok());
        assert!(matches!(
            parse_endpoint("ftp://relay.example", "relay url"),
            Err(SafeError::InvalidPayload { .. })
        ));
        assert!(parse_endpoint("relay.example", "relay url").is_err());
    }
}
