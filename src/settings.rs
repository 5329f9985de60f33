use config::{Config, ConfigError, File};
use ethers::types::{Address, H256};
use log::LevelFilter;
use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::chain::{ChainTopology, DEFAULT_ROOT_CHAIN_IDS};
use crate::pagination::{MAX_EPOCHS, MAX_LOCKS, MAX_LPS, MAX_POSITIONS, MAX_TOKENS};

#[derive(Debug, Deserialize, Clone)]
pub struct ChainSettings {
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    #[serde(default = "default_root_chain_ids")]
    pub root_chain_ids: Vec<u64>,
}

fn default_chain_id() -> u64 {
    10 // Optimism
}

fn default_root_chain_ids() -> Vec<u64> {
    DEFAULT_ROOT_CHAIN_IDS.to_vec()
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            root_chain_ids: default_root_chain_ids(),
        }
    }
}

impl ChainSettings {
    pub fn topology(&self) -> ChainTopology {
        ChainTopology::for_chain(self.chain_id, &self.root_chain_ids)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcSettings {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_http_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_call_timeout_ms() -> u64 {
    8000
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Addresses of the contracts the on-chain adapters read.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContractSettings {
    #[serde(default)]
    pub voter: Option<Address>,
    /// Factory registry.
    #[serde(default)]
    pub registry: Option<Address>,
    /// Pool factories in registration order, used when no on-chain registry
    /// is configured. The three lists below run parallel to it.
    #[serde(default)]
    pub factories: Vec<Address>,
    #[serde(default)]
    pub rewards_factories: Vec<Address>,
    #[serde(default)]
    pub gauge_factories: Vec<Address>,
    #[serde(default)]
    pub init_hashes: Vec<H256>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitSettings {
    #[serde(default = "default_max_lps")]
    pub max_lps: u64,
    #[serde(default = "default_max_positions")]
    pub max_positions: u64,
    #[serde(default = "default_max_epochs")]
    pub max_epochs: u64,
    #[serde(default = "default_max_locks")]
    pub max_locks: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
}

fn default_max_lps() -> u64 {
    MAX_LPS
}
fn default_max_positions() -> u64 {
    MAX_POSITIONS
}
fn default_max_epochs() -> u64 {
    MAX_EPOCHS
}
fn default_max_locks() -> u64 {
    MAX_LOCKS
}
fn default_max_tokens() -> u64 {
    MAX_TOKENS
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_lps: default_max_lps(),
            max_positions: default_max_positions(),
            max_epochs: default_max_epochs(),
            max_locks: default_max_locks(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceSettings {
    /// Independent lookups in flight per aggregator call.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    16
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogSettings {
    /// `level` as a filter, `info` when the name is unknown.
    pub fn level_filter(&self) -> LevelFilter {
        self.level.trim().parse().unwrap_or(LevelFilter::Info)
    }

    /// Installs the process logger at the configured level. `RUST_LOG` still
    /// refines it. An already installed logger is kept.
    pub fn init(&self) {
        let level = self.level_filter();

        #[cfg(not(feature = "observability"))]
        let installed = env_logger::Builder::new()
            .filter_level(level)
            .parse_default_env()
            .try_init()
            .is_ok();

        // The json subscriber also forwards `log` records, so it must be the
        // only logger.
        #[cfg(feature = "observability")]
        let installed = tracing_subscriber::fmt()
            .json()
            .with_max_level(tracing_level(level))
            .try_init()
            .is_ok();

        if !installed {
            log::debug!("Logger already installed, keeping it");
        }
        if self.level.trim().parse::<LevelFilter>().is_err() {
            log::warn!("Unknown log level '{}', using info", self.level);
        }
    }
}

#[cfg(feature = "observability")]
fn tracing_level(level: LevelFilter) -> tracing_subscriber::filter::LevelFilter {
    use tracing_subscriber::filter::LevelFilter as Tracing;
    match level {
        LevelFilter::Off => Tracing::OFF,
        LevelFilter::Error => Tracing::ERROR,
        LevelFilter::Warn => Tracing::WARN,
        LevelFilter::Info => Tracing::INFO,
        LevelFilter::Debug => Tracing::DEBUG,
        LevelFilter::Trace => Tracing::TRACE,
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub chain: ChainSettings,
    #[serde(default)]
    pub rpc: RpcSettings,
    #[serde(default)]
    pub contracts: ContractSettings,
    #[serde(default)]
    pub limits: LimitSettings,
    #[serde(default)]
    pub performance: PerformanceSettings,
    #[serde(default)]
    pub log: LogSettings,
}

impl Settings {
    /// Loads `Config.toml` from the working directory (optional) and applies
    /// environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(File::with_name("Config.toml").required(false))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load(File::from(path))
    }

    fn load(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self, ConfigError> {
        let s = Config::builder().add_source(file).build()?;
        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// `SUGAR_*` overrides first, then the per-chain deployment variables
    /// (`VOTER_<chain_id>`, `REGISTRY_<chain_id>`, ...).
    pub fn apply_env_overrides(&mut self) {
        if let Some(chain_id) = env_var("SUGAR_CHAIN_ID").and_then(|v| v.parse().ok()) {
            self.chain.chain_id = chain_id;
        }
        if let Some(url) = env_var("SUGAR_RPC_HTTP_URL") {
            self.rpc.http_url = url;
        }
        if let Some(timeout) = env_var("SUGAR_RPC_CALL_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.rpc.call_timeout_ms = timeout;
        }
        if let Some(level) = env_var("SUGAR_LOG_LEVEL") {
            self.log.level = level;
        }

        let chain_id = self.chain.chain_id;
        if let Some(addr) = env_address(&format!("VOTER_{}", chain_id)) {
            self.contracts.voter = Some(addr);
        }
        if let Some(addr) = env_address(&format!("REGISTRY_{}", chain_id)) {
            self.contracts.registry = Some(addr);
        }
        for (key, target) in [
            ("FACTORIES", &mut self.contracts.factories),
            ("REWARDS_FACTORIES", &mut self.contracts.rewards_factories),
            ("GAUGE_FACTORIES", &mut self.contracts.gauge_factories),
        ] {
            if let Some(raw) = env_var(&format!("{}_{}", key, chain_id)) {
                *target = parse_address_list(&raw);
            }
        }
        if let Some(raw) = env_var(&format!("INIT_HASHES_{}", chain_id)) {
            self.contracts.init_hashes = parse_hash_list(&raw);
        }
    }

    pub fn topology(&self) -> ChainTopology {
        self.chain.topology()
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_address(key: &str) -> Option<Address> {
    let raw = env_var(key)?;
    match raw.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            log::warn!("Ignoring {}: '{}' is not an address ({})", key, raw, e);
            None
        }
    }
}

/// Parses a comma separated address list, skipping invalid entries.
pub fn parse_address_list(raw: &str) -> Vec<Address> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<Address>() {
            Ok(addr) => Some(addr),
            Err(e) => {
                log::warn!("Ignoring invalid address '{}': {}", s, e);
                None
            }
        })
        .collect()
}

/// Parses a comma separated list of 32-byte hashes, skipping invalid entries.
pub fn parse_hash_list(raw: &str) -> Vec<H256> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<H256>() {
            Ok(hash) => Some(hash),
            Err(e) => {
                log::warn!("Ignoring invalid hash '{}': {}", s, e);
                None
            }
        })
        .collect()
}
