//! Chain Registry
//!
//! Maps a chain slug to its numeric chain id, the hosted Safe Transaction Service
//! endpoint and a default node RPC endpoint. The registry is an immutable value built
//! once at startup and passed to whoever needs it.
//!
//! Resolution fails closed: an unknown slug is an error unless the caller supplied an
//! explicit override for the value being resolved. A wrong relay would mean wrong
//! owner/threshold data and therefore a wrong execution.

use std::collections::HashMap;

use crate::error::{Result, SafeError};

/// Base URL of the hosted Safe Transaction Service.
pub const SAFE_HOSTED_SERVICE_BASE: &str = "https://api.safe.global/tx-service";

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// Static routing information for one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    /// Numeric EVM chain id
    pub chain_id: u64,
    /// Short name used by the hosted transaction service path (e.g. "eth", "base")
    pub service_short_name: String,
    /// Default public node RPC endpoint
    pub default_rpc_url: String,
}

/// Explicit endpoint overrides supplied by the caller (flags, env or config).
///
/// Each field, when set, wins over the registry table and skips slug validation
/// for that specific value only.
#[derive(Debug, Clone, Default)]
pub struct ChainOverrides {
    pub relay_url: Option<String>,
    pub rpc_url: Option<String>,
    pub chain_id: Option<u64>,
}

/// Fully resolved endpoints for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEndpoints {
    /// Chain slug as supplied (lowercased), if any
    pub slug: Option<String>,
    /// Numeric chain id used for safeTxHash domain separation and EIP-155 signing
    pub chain_id: u64,
    /// Transaction service base URL (no trailing slash)
    pub relay_base_url: String,
    /// Node RPC URL; only the execution path needs one
    pub rpc_url: Option<String>,
    /// True when the relay URL came from an override rather than the hosted table
    pub relay_overridden: bool,
}

impl ChainEndpoints {
    /// Whether the relay is the well-known hosted service (which rate-limits anonymous traffic).
    pub fn is_public_relay(&self) -> bool {
        self.relay_base_url.starts_with(SAFE_HOSTED_SERVICE_BASE)
    }

    /// The node endpoint, or an error naming how to supply one.
    pub fn require_rpc_url(&self) -> Result<&str> {
        self.rpc_url.as_deref().ok_or_else(|| {
            SafeError::invalid_payload(
                "rpc url",
                "no node endpoint; pass --rpc-url (or RPC_URL) or a known chain slug",
            )
        })
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Immutable slug -> chain table.
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    entries: HashMap<String, ChainEntry>,
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::with_known_chains()
    }
}

impl ChainRegistry {
    /// Creates an empty registry (only overrides will resolve).
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Creates the registry pre-populated with the chains served by the hosted service.
    pub fn with_known_chains() -> Self {
        let known: [(&str, u64, &str, &str); 8] = [
            ("mainnet", 1, "eth", "https://ethereum-rpc.publicnode.com"),
            ("ethereum", 1, "eth", "https://ethereum-rpc.publicnode.com"),
            ("optimism", 10, "oeth", "https://mainnet.optimism.io"),
            ("polygon", 137, "pol", "https://polygon-rpc.com"),
            ("base", 8453, "base", "https://mainnet.base.org"),
            ("arbitrum", 42161, "arb1", "https://arb1.arbitrum.io/rpc"),
            ("base-sepolia", 84532, "basesep", "https://sepolia.base.org"),
            ("sepolia", 11155111, "sep", "https://ethereum-sepolia-rpc.publicnode.com"),
        ];

        let entries = known
            .iter()
            .map(|(slug, chain_id, short, rpc)| {
                (
                    slug.to_string(),
                    ChainEntry {
                        chain_id: *chain_id,
                        service_short_name: short.to_string(),
                        default_rpc_url: rpc.to_string(),
                    },
                )
            })
            .collect();

        Self { entries }
    }

    /// Returns a new registry with an extra (or replaced) entry.
    pub fn with_entry(mut self, slug: &str, entry: ChainEntry) -> Self {
        self.entries.insert(slug.to_lowercase(), entry);
        self
    }

    /// Looks up a slug (case-insensitive).
    pub fn get(&self, slug: &str) -> Option<&ChainEntry> {
        self.entries.get(&slug.to_lowercase())
    }

    /// Known slugs, sorted.
    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.entries.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    /// Resolves all endpoints for a slug, honouring overrides value by value.
    ///
    /// # Arguments
    ///
    /// * `slug` - Chain slug (e.g. "base"), optional when every value is overridden
    /// * `overrides` - Explicit relay URL / RPC URL / chain id
    ///
    /// # Returns
    ///
    /// * `Ok(ChainEndpoints)` - Relay and chain id resolved (RPC URL when available)
    /// * `Err(SafeError::UnknownChain)` - Relay or chain id had no override and the slug is absent or unknown
    pub fn resolve(&self, slug: Option<&str>, overrides: &ChainOverrides) -> Result<ChainEndpoints> {
        let slug = slug.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
        let entry = slug.as_deref().and_then(|s| self.entries.get(s));

        let missing = || SafeError::UnknownChain(slug.clone().unwrap_or_else(|| "<none>".to_string()));

        let (relay_base_url, relay_overridden) = match overrides.relay_url.as_deref() {
            Some(url) => (strip_trailing_slash(url), true),
            None => {
                let entry = entry.ok_or_else(missing)?;
                (
                    format!("{}/{}/api", SAFE_HOSTED_SERVICE_BASE, entry.service_short_name),
                    false,
                )
            }
        };

        // Missing here is not fatal: the read, propose and confirm paths never touch a node
        let rpc_url = match overrides.rpc_url.as_deref() {
            Some(url) => Some(strip_trailing_slash(url)),
            None => entry.map(|e| e.default_rpc_url.clone()),
        };

        let chain_id = match overrides.chain_id {
            Some(id) => id,
            None => entry.ok_or_else(missing)?.chain_id,
        };

        Ok(ChainEndpoints {
            slug,
            chain_id,
            relay_base_url,
            rpc_url,
            relay_overridden,
        })
    }
}

fn strip_trailing_slash(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
