//! Safe Quorum CLI
//!
//! Command-line front end for the quorum coordination library: inspect a Safe,
//! list pending transactions, propose, confirm and execute.
//!
//! Results are printed as JSON on stdout; logs go to stderr.
//!
//! ## Security Requirements
//!
//! **CRITICAL**: The signing key is read from the environment variable named in the
//! config (default `SAFE_SIGNER_PRIVATE_KEY`). It is never accepted as a flag and
//! never logged.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ethereum_types::U256;
use serde::Serialize;
use tracing::debug;

use safe_quorum::chains::{ChainEndpoints, ChainOverrides, ChainRegistry};
use safe_quorum::config::Config;
use safe_quorum::crypto::{LocalSigner, SignerProvider};
use safe_quorum::evm_client::EvmClient;
use safe_quorum::proposal_file;
use safe_quorum::relay_client::RelayClient;
use safe_quorum::service::{
    ConfirmationService, ExecutionService, ExecutionSettings, PageRequest, ProposalService, QueryService,
};
use safe_quorum::validation::{to_checksum_address, warn_if_no_credential};

#[derive(Parser, Debug)]
#[command(
    name = "safe-quorum",
    author,
    version,
    about = "Propose, confirm and execute Safe multisig transactions through the Safe Transaction Service"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
struct CommonArgs {
    /// Chain slug (mainnet, base, sepolia, ...)
    #[arg(long, global = true)]
    chain: Option<String>,

    /// Custom transaction service base URL (overrides the chain table)
    #[arg(long, global = true)]
    tx_service_url: Option<String>,

    /// Node RPC URL (overrides the chain table)
    #[arg(long, global = true, env = "RPC_URL")]
    rpc_url: Option<String>,

    /// Explicit chain id (required with custom endpoints and no slug)
    #[arg(long, global = true)]
    chain_id: Option<u64>,

    /// Transaction service API key
    #[arg(long, global = true, env = "SAFE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Config file (defaults to $SAFE_QUORUM_CONFIG_PATH or config/safe-quorum.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose request logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show owners, threshold and nonce of a Safe
    Info {
        #[arg(long)]
        safe: String,
    },
    /// List pending (unexecuted) transactions with confirmation counts
    Pending {
        #[arg(long)]
        safe: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Propose a transaction and add the proposer's confirmation
    Propose {
        #[arg(long)]
        safe: String,
        /// JSON proposal file with one or more call legs
        #[arg(long, conflicts_with_all = ["to", "value", "data", "operation"])]
        file: Option<PathBuf>,
        /// Call target (single-leg proposal)
        #[arg(long, required_unless_present = "file")]
        to: Option<String>,
        /// Value in wei (decimal)
        #[arg(long)]
        value: Option<String>,
        /// Calldata (0x-prefixed hex)
        #[arg(long)]
        data: Option<String>,
        /// 0 = call, 1 = delegatecall
        #[arg(long)]
        operation: Option<u64>,
        /// Explicit Safe nonce (defaults to the current nonce)
        #[arg(long)]
        nonce: Option<String>,
    },
    /// Add this owner's confirmation to a pending transaction
    Confirm {
        #[arg(long)]
        safe: String,
        #[arg(long)]
        safe_tx_hash: String,
        /// Sign the hash without fetching and verifying the relay's bundle
        #[arg(long)]
        blind: bool,
    },
    /// Execute a transaction that has reached its threshold
    Execute {
        #[arg(long)]
        safe: String,
        #[arg(long)]
        safe_tx_hash: String,
    },
    /// Print the address of the configured signing key
    SignerAddress,
}

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.common.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let config = match &cli.common.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match &cli.command {
        Command::SignerAddress => print_signer_address(&config),
        command => run_networked(command, &cli.common, &config).await,
    }
}

async fn run_networked(command: &Command, common: &CommonArgs, config: &Config) -> Result<()> {
    let endpoints = resolve_endpoints(common, config)?;
    debug!(
        "Resolved chain {} (relay {}, rpc {})",
        endpoints.chain_id,
        endpoints.relay_base_url,
        endpoints.rpc_url.as_deref().unwrap_or("<unset>")
    );

    let api_key = common.api_key.clone().or_else(|| config.relay.api_key());
    warn_if_no_credential(&endpoints, api_key.is_some());
    let relay = Arc::new(RelayClient::new(
        endpoints.relay_base_url.clone(),
        api_key,
        config.relay.timeout(),
    )?);

    match command {
        Command::Info { safe } => {
            let query = QueryService::new(relay, endpoints.chain_id);
            print_json(&query.account_info(safe).await?)
        }
        Command::Pending { safe, limit, offset } => {
            let query = QueryService::new(relay, endpoints.chain_id);
            let page = PageRequest {
                limit: *limit,
                offset: *offset,
            };
            print_json(&query.list_pending(safe, page).await?)
        }
        Command::Propose {
            safe,
            file,
            to,
            value,
            data,
            operation,
            nonce,
        } => {
            let request = match (file, to) {
                (Some(path), _) => proposal_file::from_file(path)?,
                (None, Some(to)) => proposal_file::single_leg(
                    to,
                    value.as_deref().unwrap_or("0"),
                    data.as_deref().unwrap_or("0x"),
                    operation.unwrap_or(0),
                )?,
                (None, None) => anyhow::bail!("either --file or --to is required"),
            };
            let nonce = match nonce {
                Some(n) => Some(U256::from_dec_str(n).context("--nonce must be a decimal integer")?),
                None => request.nonce,
            };

            let signer = load_signer(config)?;
            let multisend = config.execution.multisend_address()?;
            let proposals = ProposalService::new(relay, signer, endpoints.chain_id, multisend);
            print_json(&proposals.propose(safe, request.legs, nonce).await?)
        }
        Command::Confirm {
            safe,
            safe_tx_hash,
            blind,
        } => {
            let signer = load_signer(config)?;
            let confirmations = ConfirmationService::new(relay, signer, endpoints.chain_id);
            let outcome = if *blind {
                confirmations.confirm_hash(safe, safe_tx_hash).await?
            } else {
                confirmations.confirm(safe, safe_tx_hash).await?
            };
            print_json(&outcome)
        }
        Command::Execute { safe, safe_tx_hash } => {
            let rpc_url = endpoints.require_rpc_url()?;
            let signer = load_signer(config)?;
            let node = Arc::new(EvmClient::new(rpc_url, config.relay.timeout())?);
            let executor = ExecutionService::new(
                relay,
                node,
                signer,
                endpoints.chain_id,
                ExecutionSettings::from(&config.execution),
            );
            print_json(&executor.execute(safe, safe_tx_hash).await?)
        }
        Command::SignerAddress => print_signer_address(config),
    }
}

/// Flags win over the config file; the config file wins over the chain table.
fn resolve_endpoints(common: &CommonArgs, config: &Config) -> Result<ChainEndpoints> {
    let from_config = config.chain_overrides();
    let overrides = ChainOverrides {
        relay_url: common.tx_service_url.clone().or(from_config.relay_url),
        rpc_url: common.rpc_url.clone().or(from_config.rpc_url),
        chain_id: common.chain_id.or(from_config.chain_id),
    };
    let slug = common.chain.as_deref().or(config.chain.slug.as_deref());

    let registry = ChainRegistry::with_known_chains();
    Ok(registry.resolve(slug, &overrides)?)
}

fn load_signer(config: &Config) -> Result<Arc<dyn SignerProvider>> {
    let signer = LocalSigner::from_env(&config.signer.private_key_env)?;
    Ok(Arc::new(signer))
}

fn print_signer_address(config: &Config) -> Result<()> {
    let signer = load_signer(config)?;
    print_json(&serde_json::json!({ "address": to_checksum_address(&signer.address()) }))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
