//! # Source adapter traits
//!
//! This module defines the seam between the aggregation engine and the external
//! ledgers it reads: pool factories, the voter, ERC-20 tokens, the voting
//! escrow, reward contracts, relay registries and governance-NFT collections.
//!
//! ## Overview
//!
//! Every collaborator is modelled as an injected trait object so the
//! aggregators can be driven by live RPC adapters (see `adapters`) or by the
//! in-memory ledger in `memory` without any change in the engine. Each trait
//! exposes the "count", "get by index" and "get by address/id" operations the
//! aggregators need and nothing more.
//!
//! ## Error contract
//!
//! Lookups return [`SourceError`]. `Ok(None)` is the well-defined "not found"
//! answer (for example a pool without a gauge); an `Err` means the lookup itself
//! failed. Whether an error aborts a call or degrades one field is decided by
//! the aggregator, never by the adapter.
//!
//! ## Thread Safety
//!
//! All adapters must be `Send + Sync` so one source set can serve concurrent
//! queries.

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::SourceError;
use crate::types::PoolKind;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Static and runtime state of one pool as reported by its factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub address: Address,
    pub factory: Address,
    pub token0: Address,
    pub token1: Address,
    pub kind: PoolKind,
    /// `None` when the pool's `symbol()` call failed.
    pub symbol: Option<String>,
    pub decimals: u8,
    pub liquidity: U256,
    pub reserve0: U256,
    pub reserve1: U256,
    pub tick: i32,
    pub sqrt_ratio: U256,
    /// Swap fee (basis points for basic pools, pips for concentrated pools).
    pub pool_fee: u32,
    pub unstaked_fee: u32,
    pub token0_fees: U256,
    pub token1_fees: U256,
    /// Position manager of a concentrated pool.
    pub nfpm: Option<Address>,
}

/// Gauge runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GaugeState {
    pub alive: bool,
    /// Emissions per second.
    pub emissions: U256,
    pub emissions_token: Address,
    /// Liquidity staked in the gauge.
    pub liquidity: U256,
    pub staked0: U256,
    pub staked1: U256,
}

/// An account's position inside one pool.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionState {
    /// Position NFT id, zero for fungible LP balances.
    pub id: U256,
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
}

/// Half-open timestamp window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochWindow {
    pub start: u64,
    pub end: u64,
}

impl EpochWindow {
    pub fn contains(&self, ts: u64) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// A reward deposit as recorded by a bribe or fee contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReward {
    pub token: Address,
    pub amount: U256,
    pub timestamp: u64,
    /// Reward contract that recorded the deposit.
    pub source: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowType {
    Normal,
    /// Deposited into a managed lock.
    Locked,
    Managed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockState {
    pub id: u64,
    pub owner: Address,
    pub amount: U256,
    pub voting_amount: U256,
    pub expires_at: u64,
    pub permanent: bool,
    pub voted_at: u64,
    pub delegate_id: Option<u64>,
    pub managed_id: Option<u64>,
    pub escrow_type: EscrowType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayState {
    /// Managed lock the relay compounds into.
    pub lock_id: u64,
    pub name: String,
    pub manager: Address,
    pub token: Address,
    pub balance: U256,
    pub inactive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionState {
    pub owner: Address,
    pub name: String,
    pub symbol: String,
    pub supply: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovNftState {
    pub id: U256,
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
    pub delegated: Option<Address>,
}

/// Global, factory-ordered index of pools.
#[async_trait]
pub trait PoolRegistry: Send + Sync {
    /// Number of pools across all factories.
    async fn count(&self) -> SourceResult<u64>;

    async fn get_by_index(&self, index: u64) -> SourceResult<Option<PoolState>>;

    /// Pools at the global indices in `range`, in index order. Indices that
    /// no longer resolve are left out.
    async fn get_range(&self, range: Range<u64>) -> SourceResult<Vec<PoolState>> {
        let mut states = Vec::new();
        for index in range {
            if let Some(state) = self.get_by_index(index).await? {
                states.push(state);
            }
        }
        Ok(states)
    }

    async fn get_by_address(&self, pool: Address) -> SourceResult<Option<PoolState>>;

    /// Number of pools created by one factory (zero for unknown factories).
    async fn factory_pool_count(&self, factory: Address) -> SourceResult<u64>;

    async fn factory_pool_by_index(
        &self,
        factory: Address,
        index: u64,
    ) -> SourceResult<Option<PoolState>>;
}

/// Gauge and reward-contract lookups keyed by pool.
#[async_trait]
pub trait VoterSource: Send + Sync {
    async fn gauge_for_pool(&self, pool: Address) -> SourceResult<Option<Address>>;

    async fn fee_contract_for_pool(&self, pool: Address) -> SourceResult<Option<Address>>;

    async fn bribe_contract_for_pool(&self, pool: Address) -> SourceResult<Option<Address>>;

    async fn gauge_state(&self, gauge: Address) -> SourceResult<Option<GaugeState>>;

    async fn is_whitelisted_token(&self, token: Address) -> SourceResult<bool>;
}

/// ERC-20 metadata. Implementations pass through whatever the token returns;
/// sanitising is the resolver's job.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Whether the address holds code.
    async fn exists(&self, token: Address) -> SourceResult<bool>;

    async fn symbol(&self, token: Address) -> SourceResult<String>;

    /// Raw `decimals()` word; values above 255 are possible on broken tokens.
    async fn decimals(&self, token: Address) -> SourceResult<U256>;

    async fn balance_of(&self, token: Address, account: Address) -> SourceResult<U256>;
}

#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Staked and unstaked positions of `account` in `pool`, in ledger order.
    async fn positions(&self, pool: Address, account: Address) -> SourceResult<Vec<PositionState>>;
}

/// Automated liquidity manager vaults (root chains only).
#[async_trait]
pub trait AlmSource: Send + Sync {
    async fn vault_for_pool(&self, pool: Address) -> SourceResult<Option<Address>>;

    async fn position(&self, vault: Address, account: Address) -> SourceResult<Option<PositionState>>;
}

#[async_trait]
pub trait RewardLedger: Send + Sync {
    /// Start of the first epoch the pool's gauge took part in.
    async fn first_epoch(&self, pool: Address) -> SourceResult<Option<u64>>;

    async fn votes(&self, pool: Address, epoch_start: u64) -> SourceResult<U256>;

    async fn emissions(&self, pool: Address, epoch_start: u64) -> SourceResult<U256>;

    async fn bribe_entries(&self, pool: Address, window: EpochWindow) -> SourceResult<Vec<RawReward>>;

    async fn fee_entries(&self, pool: Address, window: EpochWindow) -> SourceResult<Vec<RawReward>>;

    /// Unclaimed `(token, amount)` pairs a lock earned on a reward contract.
    async fn earned(&self, reward_contract: Address, lock_id: u64) -> SourceResult<Vec<(Address, U256)>>;
}

#[async_trait]
pub trait VotingEscrowSource: Send + Sync {
    /// The locked token.
    async fn token(&self) -> SourceResult<Address>;

    /// Highest lock id ever minted.
    async fn lock_count(&self) -> SourceResult<u64>;

    async fn lock_by_id(&self, id: u64) -> SourceResult<Option<LockState>>;

    async fn locks_by_account(&self, account: Address) -> SourceResult<Vec<u64>>;

    /// Pools the lock voted for in the current epoch with their weights.
    async fn votes_of(&self, id: u64) -> SourceResult<Vec<(Address, U256)>>;

    async fn claimable_rebase(&self, id: u64) -> SourceResult<U256>;
}

#[async_trait]
pub trait RelaySource: Send + Sync {
    /// Registry addresses in declaration order.
    async fn registries(&self) -> SourceResult<Vec<Address>>;

    async fn relays(&self, registry: Address) -> SourceResult<Vec<Address>>;

    async fn relay_state(&self, relay: Address) -> SourceResult<Option<RelayState>>;
}

#[async_trait]
pub trait FactoryRegistrySource: Send + Sync {
    /// Approved pool factories in registration order.
    async fn pool_factories(&self) -> SourceResult<Vec<Address>>;

    /// `(gauge_factory, pool_factory)`; the gauge factory is zero for unknown
    /// factories.
    async fn factories_to_pool_factory(&self, pool_factory: Address) -> SourceResult<(Address, Address)>;

    /// Init code hash of the factory's pools; zero for unknown factories.
    async fn init_hash_to_pool_factory(&self, pool_factory: Address) -> SourceResult<H256>;
}

#[async_trait]
pub trait GovNftSource: Send + Sync {
    async fn collections(&self) -> SourceResult<Vec<Address>>;

    async fn collection(&self, collection: Address) -> SourceResult<Option<CollectionState>>;

    async fn nft(&self, collection: Address, id: U256) -> SourceResult<Option<GovNftState>>;

    async fn owned_ids(&self, collection: Address, account: Address) -> SourceResult<Vec<U256>>;

    async fn minted_ids(&self, collection: Address, account: Address) -> SourceResult<Vec<U256>>;
}

/// Source of "now", used to anchor the current epoch.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Clock frozen at a given timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}
