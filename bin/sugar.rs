//! # Sugar CLI
//!
//! Runs pool queries against a live chain and prints the records as JSON.
//!
//! ## Usage
//!
//! ```bash
//! SUGAR_RPC_HTTP_URL=https://mainnet.optimism.io VOTER_10=0x... REGISTRY_10=0x... \
//!     cargo run --bin sugar -- pools --limit 10
//! cargo run --bin sugar -- root-address --factory 0x... --init-hash 0x... \
//!     --token-a 0x... --token-b 0x... --kind 100
//! ```

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use ethers::types::{Address, H256};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use sugar_sdk::adapters::{Erc20Source, PoolFactorySource, RegistryContract, RpcClient, VoterContract};
use sugar_sdk::root_pool::root_pool_address;
use sugar_sdk::sources::FactoryRegistrySource;
use sugar_sdk::types::PoolKind;
use sugar_sdk::{FactoryRegistry, MemoryLedger, Settings, Sources, Sugar};

#[derive(Parser)]
#[command(name = "sugar", about = "Read-only DEX aggregation queries")]
struct Cli {
    /// Settings file (defaults to ./Config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[cfg(feature = "observability")]
    #[arg(long, global = true)]
    metrics_listen: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pools in registry order
    Pools {
        #[arg(long, default_value_t = 100)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Routing projection of the pools
    Swaps {
        #[arg(long, default_value_t = 100)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Tokens referenced by a page of pools
    Tokens {
        #[arg(long, default_value_t = 100)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
        account: Address,
        /// Comma separated addresses to skip
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<Address>,
    },
    /// One pool by address
    Pool { address: Address },
    /// Offline CREATE2 derivation of a pool address
    RootAddress {
        #[arg(long)]
        factory: Address,
        #[arg(long)]
        init_hash: String,
        #[arg(long)]
        token_a: Address,
        #[arg(long)]
        token_b: Address,
        /// `volatile`, `stable` or a tick spacing
        #[arg(long)]
        kind: String,
    },
    /// Approved pool factories with their gauge factory and init hash
    Registry,
}

#[derive(Serialize)]
struct RegistryEntry {
    pool_factory: Address,
    gauge_factory: Address,
    init_code_hash: H256,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::new().context("failed to load settings")?,
    };
    settings.log.init();

    #[cfg(feature = "observability")]
    {
        if let Some(listen) = cli.metrics_listen {
            sugar_sdk::metrics::install_prometheus(listen)?;
        }
    }

    match cli.command {
        Command::RootAddress {
            factory,
            init_hash,
            token_a,
            token_b,
            kind,
        } => {
            let init_hash = parse_hash(&init_hash)?;
            let kind = parse_kind(&kind)?;
            let root = root_pool_address(factory, init_hash, token_a, token_b, kind).unwrap_or_else(Address::zero);
            print_json(&root)
        }
        Command::Registry => {
            let registry = registry(&settings)?;
            let mut entries = Vec::new();
            for pool_factory in registry.pool_factories().await? {
                let (gauge_factory, _) = registry.factories_to_pool_factory(pool_factory).await?;
                let init_code_hash = registry.init_hash_to_pool_factory(pool_factory).await?;
                entries.push(RegistryEntry {
                    pool_factory,
                    gauge_factory,
                    init_code_hash,
                });
            }
            print_json(&entries)
        }
        Command::Pools { limit, offset } => print_json(&connect(&settings).await?.lp.all(limit, offset).await?),
        Command::Swaps { limit, offset } => {
            print_json(&connect(&settings).await?.lp.for_swaps(limit, offset).await?)
        }
        Command::Tokens {
            limit,
            offset,
            account,
            exclude,
        } => print_json(
            &connect(&settings)
                .await?
                .lp
                .tokens(limit, offset, account, &exclude)
                .await?,
        ),
        Command::Pool { address } => print_json(&connect(&settings).await?.lp.by_address(address).await?),
    }
}

/// On-chain registry when `REGISTRY_<chain>` is set, otherwise the configured
/// factory lists.
fn registry(settings: &Settings) -> Result<Arc<dyn FactoryRegistrySource>> {
    let contracts = &settings.contracts;
    if let Some(address) = contracts.registry {
        let rpc = RpcClient::connect(&settings.rpc)?;
        return Ok(Arc::new(
            RegistryContract::new(rpc, address).with_init_hashes(&contracts.factories, &contracts.init_hashes),
        ));
    }
    let registry = FactoryRegistry::from_lists(
        Address::zero(),
        &contracts.factories,
        &contracts.rewards_factories,
        &contracts.gauge_factories,
        &contracts.init_hashes,
    )?;
    Ok(Arc::new(registry))
}

async fn connect(settings: &Settings) -> Result<Sugar> {
    let rpc = RpcClient::connect(&settings.rpc)?;
    let voter = settings
        .contracts
        .voter
        .with_context(|| format!("no voter configured (VOTER_{})", settings.chain.chain_id))?;

    let registry = registry(settings)?;
    let factories = registry.pool_factories().await?;
    if factories.is_empty() {
        bail!("no pool factories registered");
    }
    log::info!("Querying {} pool factories", factories.len());

    // Positions, rewards, escrow, relays and governance NFTs have no RPC
    // adapter; the CLI leaves them empty.
    let offline = Arc::new(MemoryLedger::new());
    let sources = Sources {
        pools: Arc::new(
            PoolFactorySource::new(rpc.clone(), factories)
                .with_concurrency(settings.performance.max_concurrency),
        ),
        voter: Arc::new(VoterContract::new(rpc.clone(), voter)),
        tokens: Arc::new(Erc20Source::new(rpc)),
        registry,
        ..Sources::from_memory(offline, Arc::new(FactoryRegistry::new(Address::zero())))
    };
    Ok(Sugar::from_settings(sources, settings))
}

fn parse_hash(raw: &str) -> Result<H256> {
    let bytes = hex::decode(raw.trim_start_matches("0x")).context("init hash is not hex")?;
    if bytes.len() != 32 {
        bail!("init hash must be 32 bytes, got {}", bytes.len());
    }
    Ok(H256::from_slice(&bytes))
}

fn parse_kind(raw: &str) -> Result<PoolKind> {
    match raw {
        "volatile" => Ok(PoolKind::Volatile),
        "stable" => Ok(PoolKind::Stable),
        other => {
            let tick_spacing: i32 = other
                .parse()
                .with_context(|| format!("unknown pool kind '{}'", other))?;
            if tick_spacing <= 0 {
                bail!("tick spacing must be positive");
            }
            Ok(PoolKind::Concentrated { tick_spacing })
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
