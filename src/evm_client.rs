//! EVM Node Client
//!
//! Minimal JSON-RPC client for the settlement step: chain id check, Safe nonce read,
//! and submission of a locally signed legacy (EIP-155) transaction. The node is only
//! contacted by execution, and only after the relay bundle passed the integrity check.

use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::abi::{decode_u256_word, encode_nonce_call, keccak256};
use crate::crypto::SignerProvider;
use crate::error::{Result, SafeError};
use crate::relay_client::parse_endpoint;
use crate::validation::validate_hash;

// ============================================================================
// RPC TYPES
// ============================================================================

/// Subset of `eth_getTransactionReceipt` the execution path needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

impl TransactionReceipt {
    /// Post-Byzantium status flag: "0x1" is success.
    pub fn succeeded(&self) -> bool {
        self.status.as_deref() == Some("0x1")
    }

    pub fn block_number(&self) -> Option<u64> {
        let raw = self.block_number.as_deref()?;
        parse_quantity(raw, "blockNumber").ok().map(|n| n.low_u64())
    }
}

/// Parses a JSON-RPC hex quantity ("0x1a").
pub fn parse_quantity(value: &str, label: &str) -> Result<U256> {
    let clean = value.strip_prefix("0x").unwrap_or(value);
    if clean.is_empty() {
        return Ok(U256::zero());
    }
    U256::from_str_radix(clean, 16)
        .map_err(|_| SafeError::malformed(label, format!("'{}' is not a hex quantity", value)))
}

// ============================================================================
// CLIENT
// ============================================================================

/// JSON-RPC client for one node endpoint.
pub struct EvmClient {
    /// HTTP client instance
    client: Client,
    /// Node RPC URL
    rpc_url: String,
    /// Per-call deadline
    timeout: Duration,
}

impl EvmClient {
    /// Creates a new node client.
    ///
    /// # Arguments
    ///
    /// * `rpc_url` - Node JSON-RPC endpoint
    /// * `timeout` - Deadline applied to every call
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let rpc_url = rpc_url.into();
        parse_endpoint(&rpc_url, "rpc url")?;
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| SafeError::Network {
                endpoint: rpc_url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            rpc_url,
            timeout,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// `eth_chainId`
    pub async fn chain_id(&self) -> Result<u64> {
        let hex: String = self.json_rpc("eth_chainId", vec![]).await?;
        let id = parse_quantity(&hex, "eth_chainId")?;
        if id > U256::from(u64::MAX) {
            return Err(SafeError::malformed("eth_chainId", format!("chain id {} too large", id)));
        }
        Ok(id.low_u64())
    }

    /// Reads `nonce()` from the Safe contract at the latest block.
    pub async fn get_safe_nonce(&self, safe: &Address) -> Result<U256> {
        let call = json!({
            "to": format!("{:#x}", safe),
            "data": format!("0x{}", hex::encode(encode_nonce_call())),
        });
        let result: String = self.json_rpc("eth_call", vec![call, json!("latest")]).await?;
        decode_u256_word(&result)
    }

    /// `eth_getTransactionCount(address, "pending")`
    pub async fn transaction_count(&self, address: &Address) -> Result<U256> {
        let hex: String = self
            .json_rpc(
                "eth_getTransactionCount",
                vec![json!(format!("{:#x}", address)), json!("pending")],
            )
            .await?;
        parse_quantity(&hex, "eth_getTransactionCount")
    }

    /// `eth_gasPrice`
    pub async fn gas_price(&self) -> Result<U256> {
        let hex: String = self.json_rpc("eth_gasPrice", vec![]).await?;
        parse_quantity(&hex, "eth_gasPrice")
    }

    /// `eth_estimateGas` for a call from `from` to `to` with `data`.
    pub async fn estimate_gas(&self, from: &Address, to: &Address, data: &[u8]) -> Result<U256> {
        let call = json!({
            "from": format!("{:#x}", from),
            "to": format!("{:#x}", to),
            "data": format!("0x{}", hex::encode(data)),
        });
        let hex: String = self.json_rpc("eth_estimateGas", vec![call]).await?;
        parse_quantity(&hex, "eth_estimateGas")
    }

    /// `eth_sendRawTransaction`; returns the transaction hash reported by the node.
    pub async fn send_raw_transaction(&self, raw_tx: &[u8]) -> Result<H256> {
        let hash: String = self
            .json_rpc(
                "eth_sendRawTransaction",
                vec![json!(format!("0x{}", hex::encode(raw_tx)))],
            )
            .await?;
        validate_hash(&hash, "transaction hash").map_err(|e| SafeError::malformed("eth_sendRawTransaction", e.to_string()))
    }

    /// Polls for a receipt until one appears or the deadline passes.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: &H256,
        poll_interval: Duration,
        deadline: Duration,
    ) -> Result<TransactionReceipt> {
        let started = tokio::time::Instant::now();
        loop {
            let receipt: Option<TransactionReceipt> = self
                .json_rpc("eth_getTransactionReceipt", vec![json!(format!("{:#x}", tx_hash))])
                .await?;

            if let Some(receipt) = receipt {
                return Ok(receipt);
            }

            if started.elapsed() + poll_interval > deadline {
                return Err(SafeError::Network {
                    endpoint: self.rpc_url.clone(),
                    reason: format!(
                        "no receipt for {:#x} within {}ms",
                        tx_hash,
                        deadline.as_millis()
                    ),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Builds, signs and broadcasts a legacy EIP-155 transaction with zero value.
    ///
    /// Gas limit is the node's estimate scaled by `gas_limit_multiplier_percent`.
    ///
    /// # Returns
    ///
    /// * `Ok(H256)` - Transaction hash accepted by the node
    /// * `Err(SafeError::Protocol)` - Node rejected the transaction (message surfaced verbatim)
    pub async fn sign_and_send(
        &self,
        signer: &dyn SignerProvider,
        to: &Address,
        calldata: &[u8],
        chain_id: u64,
        gas_limit_multiplier_percent: u64,
    ) -> Result<H256> {
        let from = signer.address();

        let nonce = self.transaction_count(&from).await?;
        let gas_price = self.gas_price().await?;
        let estimate = self.estimate_gas(&from, to, calldata).await?;
        let gas_limit = scaled_gas_limit(estimate, gas_limit_multiplier_percent)?;

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: *to,
            value: U256::zero(),
            data: calldata.to_vec(),
            chain_id,
        };

        let digest = tx.signing_hash();
        let signature = signer.sign_digest(&digest)?;
        let raw = tx.encode_signed(signature.r.as_bytes(), signature.s.as_bytes(), signature.recovery_id);

        debug!(
            "Raw tx: nonce={}, gas_price={}, gas_limit={}, chain_id={}, from={:#x}",
            nonce, gas_price, gas_limit, chain_id, from
        );

        let hash = self.send_raw_transaction(&raw).await?;
        info!("Broadcast transaction {:#x} from {:#x}", hash, from);
        Ok(hash)
    }

    /// Generic JSON-RPC call helper.
    async fn json_rpc<T: DeserializeOwned>(&self, method: &str, params: Vec<serde_json::Value>) -> Result<T> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1,
        });

        let rpc_future = async {
            let resp = self.client.post(&self.rpc_url).json(&request).send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match tokio::time::timeout(self.timeout, rpc_future).await {
            Err(_) => {
                return Err(SafeError::Network {
                    endpoint: self.rpc_url.clone(),
                    reason: format!("timed out after {}ms waiting for {}", self.timeout.as_millis(), method),
                })
            }
            Ok(Err(e)) => {
                return Err(SafeError::Network {
                    endpoint: self.rpc_url.clone(),
                    reason: format!("{} failed: {}", method, e),
                })
            }
            Ok(Ok(pair)) => pair,
        };

        if !status.is_success() {
            return Err(SafeError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        let response: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| SafeError::malformed(method, e.to_string()))?;

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            let message = error.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error");
            return Err(SafeError::Protocol {
                status: status.as_u16(),
                body: format!("JSON-RPC error from {} ({}): {} (code: {})", self.rpc_url, method, message, code),
            });
        }

        let result = response
            .get("result")
            .ok_or_else(|| SafeError::malformed(method, "no result in response"))?;

        serde_json::from_value(result.clone()).map_err(|e| SafeError::malformed(method, e.to_string()))
    }
}

// ============================================================================
// LEGACY TRANSACTION (EIP-155)
// ============================================================================

/// Pre-EIP-1559 transaction, replay-protected with the chain id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn base_items(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_encode_u256(&self.nonce),
            rlp_encode_u256(&self.gas_price),
            rlp_encode_u256(&self.gas_limit),
            self.to.as_bytes().to_vec(),
            rlp_encode_u256(&self.value),
            self.data.clone(),
        ]
    }

    /// keccak256(rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0]))
    pub fn signing_hash(&self) -> H256 {
        let mut items = self.base_items();
        items.push(rlp_encode_u64(self.chain_id));
        items.push(vec![]);
        items.push(vec![]);
        keccak256(&rlp_encode_list(&items))
    }

    /// rlp([nonce, gasPrice, gasLimit, to, value, data, v, r, s]) with v = recid + chainId * 2 + 35.
    pub fn encode_signed(&self, r: &[u8], s: &[u8], recovery_id: u8) -> Vec<u8> {
        let v = U256::from(recovery_id) + U256::from(self.chain_id) * U256::from(2u64) + U256::from(35u64);
        let mut items = self.base_items();
        items.push(rlp_encode_u256(&v));
        items.push(strip_leading_zeros(r).to_vec());
        items.push(strip_leading_zeros(s).to_vec());
        rlp_encode_list(&items)
    }
}

// ============================================================================
// RLP ENCODING HELPERS
// ============================================================================

/// Applies the headroom percentage to a node's gas estimate.
fn scaled_gas_limit(estimate: U256, percent: u64) -> Result<U256> {
    estimate
        .checked_mul(U256::from(percent))
        .map(|scaled| scaled / U256::from(100u64))
        .ok_or_else(|| SafeError::malformed("eth_estimateGas", format!("estimate {} overflows at {}%", estimate, percent)))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Encode a u64 as big-endian bytes with no leading zeros (RLP integer format).
fn rlp_encode_u64(val: u64) -> Vec<u8> {
    strip_leading_zeros(&val.to_be_bytes()).to_vec()
}

fn rlp_encode_u256(val: &U256) -> Vec<u8> {
    let mut word = [0u8; 32];
    val.to_big_endian(&mut word);
    strip_leading_zeros(&word).to_vec()
}

/// RLP-encode a single byte-string item.
fn rlp_encode_item(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        // Single byte below 0x80: encoded as itself
        vec![data[0]]
    } else if data.len() <= 55 {
        let mut out = vec![0x80 + data.len() as u8];
        out.extend_from_slice(data);
        out
    } else {
        let len_bytes = rlp_encode_u64(data.len() as u64);
        let mut out = vec![0xb7 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(data);
        out
    }
}

/// RLP-encode a list of items (each item is raw bytes, not yet RLP-encoded).
fn rlp_encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    for item in items {
        payload.extend(rlp_encode_item(item));
    }

    if payload.len() <= 55 {
        let mut out = vec![0xc0 + payload.len() as u8];
        out.extend(payload);
        out
    } else {
        let len_bytes = rlp_encode_u64(payload.len() as u64);
        let mut out = vec![0xf7 + len_bytes.len() as u8];
        out.extend_from_slice(&len_bytes);
        out.extend(payload);
        out
    }
}
