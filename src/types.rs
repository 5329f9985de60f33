//! Record types returned by the aggregators.
//!
//! Every record is a snapshot assembled during one call. Addresses that could
//! not be resolved are reported as the zero address so the records keep a fixed
//! shape at any wire boundary.

use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::Degradation;

/// Length of one voting/reward epoch in seconds.
pub const WEEK: u64 = 7 * 24 * 60 * 60;

/// Start of the epoch containing `ts`. Boundaries are inclusive-lower.
pub fn epoch_start(ts: u64) -> u64 {
    ts - ts % WEEK
}

/// Zero-address sentinel for an optional address.
pub fn or_zero(addr: Option<Address>) -> Address {
    addr.unwrap_or_else(Address::zero)
}

/// Pool flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    Volatile,
    Stable,
    Concentrated { tick_spacing: i32 },
}

impl PoolKind {
    pub fn is_concentrated(&self) -> bool {
        matches!(self, PoolKind::Concentrated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pool {
    pub lp: Address,
    pub symbol: String,
    pub decimals: u8,
    pub liquidity: U256,
    pub kind: PoolKind,
    pub tick: i32,
    pub sqrt_ratio: U256,
    pub token0: Address,
    pub reserve0: U256,
    pub staked0: U256,
    pub token1: Address,
    pub reserve1: U256,
    pub staked1: U256,
    pub gauge: Address,
    pub gauge_liquidity: U256,
    pub gauge_alive: bool,
    pub fee: Address,
    pub bribe: Address,
    pub factory: Address,
    pub emissions: U256,
    pub emissions_token: Address,
    pub pool_fee: u32,
    pub unstaked_fee: u32,
    pub token0_fees: U256,
    pub token1_fees: U256,
    pub nfpm: Address,
    pub alm: Address,
    pub root: Address,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

/// Reduced pool projection used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSwapView {
    pub lp: Address,
    pub kind: PoolKind,
    pub token0: Address,
    pub token1: Address,
    pub factory: Address,
    pub pool_fee: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reasons", rename_all = "snake_case")]
pub enum Resolution {
    Resolved,
    Degraded(Vec<Degradation>),
}

impl Resolution {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolution::Degraded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub token_address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub account_balance: U256,
    pub listed: bool,
    pub status: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub id: U256,
    pub lp: Address,
    pub account: Address,
    pub liquidity: U256,
    pub staked: bool,
    pub amount0: U256,
    pub amount1: U256,
    pub staked0: U256,
    pub staked1: U256,
    pub unstaked_earned0: U256,
    pub unstaked_earned1: U256,
    pub emissions_earned: U256,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub alm: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    Bribe,
    Fee,
    Rebase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardEntry {
    pub kind: RewardKind,
    pub lp: Address,
    pub token: Address,
    pub amount: U256,
    /// Start of the epoch the entry was bucketed into.
    pub epoch: u64,
    /// Reward contract holding the entry (zero for rebases).
    pub source: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Epoch {
    pub ts: u64,
    pub lp: Address,
    pub votes: U256,
    pub emissions: U256,
    pub bribes: Vec<RewardEntry>,
    pub fees: Vec<RewardEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

/// Gauge, fee and bribe contracts of a root pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RootAddresses {
    pub gauge: Address,
    pub fee: Address,
    pub bribe: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockVote {
    pub lp: Address,
    pub weight: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VeLock {
    pub id: u64,
    pub account: Address,
    pub decimals: u8,
    pub amount: U256,
    /// Economic ve balance.
    pub voting_amount: U256,
    /// Governance weight, zero for managed locks.
    pub voting_power: U256,
    pub rebase_amount: U256,
    pub expires_at: u64,
    pub voted_at: u64,
    pub votes: Vec<LockVote>,
    pub token: Address,
    pub permanent: bool,
    pub delegate_id: u64,
    pub managed_id: u64,
    pub managed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relay {
    pub address: Address,
    pub registry: Address,
    pub lock_id: u64,
    pub token: Address,
    pub balance: U256,
    pub voting_amount: U256,
    pub name: String,
    pub manager: Address,
    pub inactive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryRegistration {
    pub pool_factory: Address,
    pub gauge_factory: Address,
    pub rewards_factory: Address,
    pub init_code_hash: H256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GovNftCollection {
    pub address: Address,
    pub owner: Address,
    pub name: String,
    pub symbol: String,
    pub supply: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GovNft {
    pub id: U256,
    pub address: Address,
    pub owner: Address,
    pub minter: Address,
    pub token: Address,
    pub vault: Address,
    pub amount: U256,
    pub total_locked: U256,
    pub amount_claimed: U256,
    pub claimable: U256,
    pub split_count: u64,
    pub cliff_length: u64,
    pub start: u64,
    pub end: u64,
    pub delegated: Address,
}
