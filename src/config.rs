//! Configuration Management Module
//!
//! Loads the client configuration: which chain to talk to, how to reach the relay and
//! the node, where the signing key lives and how execution is paced. The config file
//! holds environment variable *names*, never key material.
//!
//! Every value has a default so the CLI works from flags alone when no file exists.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use ethereum_types::Address;
use serde::{Deserialize, Serialize};

use crate::chains::ChainOverrides;
use crate::crypto::DEFAULT_PRIVATE_KEY_ENV;
use crate::transaction::DEFAULT_MULTISEND_CALL_ONLY;
use crate::validation::validate_address;

/// Environment variable pointing at a custom config file.
pub const CONFIG_PATH_ENV: &str = "SAFE_QUORUM_CONFIG_PATH";

/// Config file used when `SAFE_QUORUM_CONFIG_PATH` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/safe-quorum.toml";

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Chain selection and endpoint overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain slug looked up in the registry (e.g. "base", "sepolia")
    #[serde(default)]
    pub slug: Option<String>,
    /// Custom transaction service base URL (skips the hosted table)
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Custom node RPC URL
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Explicit chain id (required for custom chains without a slug)
    #[serde(default)]
    pub chain_id: Option<u64>,
}

/// Relay client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Environment variable name containing the relay API key
    /// Default: "SAFE_API_KEY"
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Per-request timeout for relay and node calls in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Signer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Environment variable name containing the owner's hex private key
    /// Default: "SAFE_SIGNER_PRIVATE_KEY"
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

/// Execution pacing and batching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// MultiSendCallOnly deployment used for multi-leg proposals
    #[serde(default = "default_multisend_call_only_addr")]
    pub multisend_call_only_addr: String,
    /// Receipt polling interval in milliseconds
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    /// Maximum time to wait for a receipt in milliseconds
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    /// Gas limit = estimate * percent / 100
    #[serde(default = "default_gas_limit_multiplier_percent")]
    pub gas_limit_multiplier_percent: u64,
}

fn default_api_key_env() -> String {
    "SAFE_API_KEY".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_private_key_env() -> String {
    DEFAULT_PRIVATE_KEY_ENV.to_string()
}

fn default_multisend_call_only_addr() -> String {
    DEFAULT_MULTISEND_CALL_ONLY.to_string()
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

fn default_receipt_timeout_ms() -> u64 {
    120_000
}

fn default_gas_limit_multiplier_percent() -> u64 {
    120
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            private_key_env: default_private_key_env(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            multisend_call_only_addr: default_multisend_call_only_addr(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            receipt_timeout_ms: default_receipt_timeout_ms(),
            gas_limit_multiplier_percent: default_gas_limit_multiplier_percent(),
        }
    }
}

impl RelayConfig {
    /// Reads the relay API key from the configured environment variable.
    ///
    /// Absence is not an error: the hosted relay accepts anonymous (rate limited) traffic.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ExecutionConfig {
    pub fn multisend_address(&self) -> anyhow::Result<Address> {
        validate_address(&self.multisend_call_only_addr, "multisend_call_only_addr")
            .context("Configuration error: [execution] multisend_call_only_addr")
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl Config {
    /// Validates value ranges and addresses.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Configuration is valid
    /// - `Err(anyhow::Error)` - A value is out of range or malformed
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.relay.timeout_ms == 0 {
            anyhow::bail!("Configuration error: [relay] timeout_ms must be greater than 0");
        }
        if self.relay.api_key_env.is_empty() {
            anyhow::bail!("Configuration error: [relay] api_key_env must not be empty");
        }
        if self.signer.private_key_env.is_empty() {
            anyhow::bail!("Configuration error: [signer] private_key_env must not be empty");
        }
        if self.execution.receipt_poll_interval_ms == 0 {
            anyhow::bail!("Configuration error: [execution] receipt_poll_interval_ms must be greater than 0");
        }
        if self.execution.receipt_timeout_ms < self.execution.receipt_poll_interval_ms {
            anyhow::bail!(
                "Configuration error: [execution] receipt_timeout_ms ({}) is shorter than receipt_poll_interval_ms ({})",
                self.execution.receipt_timeout_ms,
                self.execution.receipt_poll_interval_ms
            );
        }
        if self.execution.gas_limit_multiplier_percent < 100 {
            anyhow::bail!(
                "Configuration error: [execution] gas_limit_multiplier_percent must be at least 100, got {}",
                self.execution.gas_limit_multiplier_percent
            );
        }
        self.execution.multisend_address()?;
        if self.chain.chain_id == Some(0) {
            anyhow::bail!("Configuration error: [chain] chain_id must not be 0");
        }
        Ok(())
    }

    /// Loads configuration from the TOML file.
    ///
    /// Uses `SAFE_QUORUM_CONFIG_PATH` if set, otherwise `config/safe-quorum.toml`.
    /// A missing file yields the defaults.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        if Path::new(&config_path).exists() {
            Self::load_from_path(&config_path)
        } else {
            tracing::debug!("Config file '{}' not found, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Loads and validates a specific TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Endpoint overrides taken from the `[chain]` section.
    pub fn chain_overrides(&self) -> ChainOverrides {
        ChainOverrides {
            relay_url: self.chain.relay_url.clone(),
            rpc_url: self.chain.rpc_url.clone(),
            chain_id: self.chain.chain_id,
        }
    }
}
