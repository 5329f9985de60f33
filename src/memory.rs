//! # In-memory ledger
//!
//! A single in-process implementation of every source trait. It backs the
//! integration tests and local demos, and lets a higher-level service run the
//! aggregators against a snapshot it already holds.
//!
//! Keyed state lives in `DashMap`s so the ledger can be shared behind an `Arc`
//! and still be mutated between calls (which is how the tests reproduce read
//! skew between paginated queries). Ordered collections (global pool index,
//! relay registries, collections) keep insertion order.
//!
//! Any source can be switched to "unavailable" with [`MemoryLedger::fail`] to
//! exercise the error paths.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use ethers::types::{Address, U256};
use indexmap::IndexMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::SourceError;
use crate::sources::{
    AlmSource, CollectionState, EpochWindow, GaugeState, GovNftSource, GovNftState, LockState,
    PoolRegistry, PoolState, PositionSource, PositionState, RawReward, RelaySource, RelayState,
    RewardLedger, SourceResult, TokenSource, VoterSource, VotingEscrowSource,
};

/// Source names accepted by [`MemoryLedger::fail`].
pub const POOLS: &str = "pools";
pub const VOTER: &str = "voter";
pub const TOKENS: &str = "tokens";
pub const POSITIONS: &str = "positions";
pub const ALM: &str = "alm";
pub const REWARDS: &str = "rewards";
pub const ESCROW: &str = "escrow";
/// Only the escrow's `token()` lookup.
pub const ESCROW_TOKEN: &str = "escrow_token";
pub const RELAYS: &str = "relays";
pub const GOVNFT: &str = "govnft";

/// Behaviour of one token contract.
#[derive(Debug, Clone)]
pub struct MemoryToken {
    pub has_code: bool,
    pub symbol: SourceResult<String>,
    pub decimals: SourceResult<U256>,
}

impl MemoryToken {
    pub fn erc20(symbol: &str, decimals: u8) -> Self {
        Self {
            has_code: true,
            symbol: Ok(symbol.to_string()),
            decimals: Ok(U256::from(decimals)),
        }
    }

    /// A contract whose metadata calls revert.
    pub fn reverting() -> Self {
        Self {
            has_code: true,
            symbol: Err(SourceError::Reverted("symbol()".to_string())),
            decimals: Err(SourceError::Reverted("decimals()".to_string())),
        }
    }

    /// A token whose `decimals()` returns a raw word.
    pub fn with_raw_decimals(mut self, raw: U256) -> Self {
        self.decimals = Ok(raw);
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct GaugeLink {
    gauge: Address,
    fee: Address,
    bribe: Address,
}

#[derive(Default)]
pub struct MemoryLedger {
    unavailable: DashSet<&'static str>,

    pools: RwLock<IndexMap<Address, PoolState>>,
    gauges: DashMap<Address, GaugeLink>,
    gauge_states: DashMap<Address, GaugeState>,
    whitelist: DashSet<Address>,

    tokens: DashMap<Address, MemoryToken>,
    balances: DashMap<(Address, Address), U256>,

    positions: DashMap<(Address, Address), Vec<PositionState>>,
    alm_vaults: DashMap<Address, Address>,
    alm_positions: DashMap<(Address, Address), PositionState>,

    first_epochs: DashMap<Address, u64>,
    votes: DashMap<(Address, u64), U256>,
    emissions: DashMap<(Address, u64), U256>,
    bribes: DashMap<Address, Vec<RawReward>>,
    fees: DashMap<Address, Vec<RawReward>>,
    earned: DashMap<(Address, u64), Vec<(Address, U256)>>,

    ve_token: RwLock<Address>,
    lock_count: AtomicU64,
    locks: DashMap<u64, LockState>,
    lock_votes: DashMap<u64, Vec<(Address, U256)>>,
    rebases: DashMap<u64, U256>,

    relay_registries: RwLock<Vec<Address>>,
    relays: DashMap<Address, Vec<Address>>,
    relay_states: DashMap<Address, RelayState>,

    collections: RwLock<Vec<Address>>,
    collection_states: DashMap<Address, CollectionState>,
    nfts: DashMap<(Address, U256), GovNftState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every lookup of `source` fail with `SourceError::Unavailable`.
    pub fn fail(&self, source: &'static str) {
        self.unavailable.insert(source);
    }

    pub fn restore(&self, source: &'static str) {
        self.unavailable.remove(source);
    }

    fn check(&self, source: &'static str) -> SourceResult<()> {
        if self.unavailable.contains(source) {
            return Err(SourceError::Unavailable(format!("{} offline", source)));
        }
        Ok(())
    }

    // ---- pools & voter -------------------------------------------------

    /// Appends a pool to the global index.
    pub fn add_pool(&self, pool: PoolState) {
        let mut pools = self.pools.write().unwrap_or_else(|e| e.into_inner());
        pools.insert(pool.address, pool);
    }

    pub fn set_gauge(&self, pool: Address, gauge: Address, fee: Address, bribe: Address, state: GaugeState) {
        self.gauges.insert(pool, GaugeLink { gauge, fee, bribe });
        self.gauge_states.insert(gauge, state);
    }

    pub fn whitelist(&self, token: Address) {
        self.whitelist.insert(token);
    }

    // ---- tokens --------------------------------------------------------

    pub fn add_token(&self, token: Address, behaviour: MemoryToken) {
        self.tokens.insert(token, behaviour);
    }

    pub fn set_balance(&self, token: Address, account: Address, amount: U256) {
        self.balances.insert((token, account), amount);
    }

    // ---- positions -----------------------------------------------------

    pub fn add_position(&self, pool: Address, account: Address, position: PositionState) {
        self.positions.entry((pool, account)).or_default().push(position);
    }

    pub fn set_alm_vault(&self, pool: Address, vault: Address) {
        self.alm_vaults.insert(pool, vault);
    }

    pub fn set_alm_position(&self, vault: Address, account: Address, position: PositionState) {
        self.alm_positions.insert((vault, account), position);
    }

    // ---- rewards -------------------------------------------------------

    pub fn set_first_epoch(&self, pool: Address, epoch_start: u64) {
        self.first_epochs.insert(pool, epoch_start);
    }

    pub fn set_epoch(&self, pool: Address, epoch_start: u64, votes: U256, emissions: U256) {
        self.votes.insert((pool, epoch_start), votes);
        self.emissions.insert((pool, epoch_start), emissions);
    }

    pub fn add_bribe(&self, pool: Address, reward: RawReward) {
        self.bribes.entry(pool).or_default().push(reward);
    }

    pub fn add_fee(&self, pool: Address, reward: RawReward) {
        self.fees.entry(pool).or_default().push(reward);
    }

    pub fn set_earned(&self, reward_contract: Address, lock_id: u64, earned: Vec<(Address, U256)>) {
        self.earned.insert((reward_contract, lock_id), earned);
    }

    // ---- voting escrow -------------------------------------------------

    pub fn set_ve_token(&self, token: Address) {
        *self.ve_token.write().unwrap_or_else(|e| e.into_inner()) = token;
    }

    pub fn add_lock(&self, lock: LockState) {
        self.lock_count.fetch_max(lock.id, Ordering::SeqCst);
        self.locks.insert(lock.id, lock);
    }

    /// Removes a lock; its id stays counted.
    pub fn burn_lock(&self, id: u64) {
        self.locks.remove(&id);
    }

    pub fn set_lock_votes(&self, id: u64, votes: Vec<(Address, U256)>) {
        self.lock_votes.insert(id, votes);
    }

    pub fn set_rebase(&self, id: u64, amount: U256) {
        self.rebases.insert(id, amount);
    }

    // ---- relays --------------------------------------------------------

    pub fn add_relay(&self, registry: Address, relay: Address, state: RelayState) {
        {
            let mut registries = self.relay_registries.write().unwrap_or_else(|e| e.into_inner());
            if !registries.contains(&registry) {
                registries.push(registry);
            }
        }
        self.relays.entry(registry).or_default().push(relay);
        self.relay_states.insert(relay, state);
    }

    pub fn add_relay_registry(&self, registry: Address) {
        let mut registries = self.relay_registries.write().unwrap_or_else(|e| e.into_inner());
        if !registries.contains(&registry) {
            registries.push(registry);
        }
    }

    // ---- governance NFTs -----------------------------------------------

    pub fn add_collection(&self, collection: Address, state: CollectionState) {
        {
            let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
            if !collections.contains(&collection) {
                collections.push(collection);
            }
        }
        self.collection_states.insert(collection, state);
    }

    pub fn add_govnft(&self, collection: Address, nft: GovNftState) {
        self.nfts.insert((collection, nft.id), nft);
    }

    fn pool_snapshot(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<Address, PoolState>> {
        self.pools.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PoolRegistry for MemoryLedger {
    async fn count(&self) -> SourceResult<u64> {
        self.check(POOLS)?;
        Ok(self.pool_snapshot().len() as u64)
    }

    async fn get_by_index(&self, index: u64) -> SourceResult<Option<PoolState>> {
        self.check(POOLS)?;
        let pools = self.pool_snapshot();
        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| pools.get_index(i))
            .map(|(_, p)| p.clone()))
    }

    async fn get_range(&self, range: Range<u64>) -> SourceResult<Vec<PoolState>> {
        self.check(POOLS)?;
        let pools = self.pool_snapshot();
        let end = usize::try_from(range.end).unwrap_or(usize::MAX).min(pools.len());
        let start = usize::try_from(range.start).unwrap_or(usize::MAX).min(end);
        Ok((start..end)
            .filter_map(|i| pools.get_index(i))
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn get_by_address(&self, pool: Address) -> SourceResult<Option<PoolState>> {
        self.check(POOLS)?;
        Ok(self.pool_snapshot().get(&pool).cloned())
    }

    async fn factory_pool_count(&self, factory: Address) -> SourceResult<u64> {
        self.check(POOLS)?;
        Ok(self
            .pool_snapshot()
            .values()
            .filter(|p| p.factory == factory)
            .count() as u64)
    }

    async fn factory_pool_by_index(&self, factory: Address, index: u64) -> SourceResult<Option<PoolState>> {
        self.check(POOLS)?;
        let Ok(index) = usize::try_from(index) else {
            return Ok(None);
        };
        Ok(self
            .pool_snapshot()
            .values()
            .filter(|p| p.factory == factory)
            .nth(index)
            .cloned())
    }
}

#[async_trait]
impl VoterSource for MemoryLedger {
    async fn gauge_for_pool(&self, pool: Address) -> SourceResult<Option<Address>> {
        self.check(VOTER)?;
        Ok(self.gauges.get(&pool).map(|l| l.gauge))
    }

    async fn fee_contract_for_pool(&self, pool: Address) -> SourceResult<Option<Address>> {
        self.check(VOTER)?;
        Ok(self.gauges.get(&pool).map(|l| l.fee))
    }

    async fn bribe_contract_for_pool(&self, pool: Address) -> SourceResult<Option<Address>> {
        self.check(VOTER)?;
        Ok(self.gauges.get(&pool).map(|l| l.bribe))
    }

    async fn gauge_state(&self, gauge: Address) -> SourceResult<Option<GaugeState>> {
        self.check(VOTER)?;
        Ok(self.gauge_states.get(&gauge).map(|s| s.clone()))
    }

    async fn is_whitelisted_token(&self, token: Address) -> SourceResult<bool> {
        self.check(VOTER)?;
        Ok(self.whitelist.contains(&token))
    }
}

#[async_trait]
impl TokenSource for MemoryLedger {
    async fn exists(&self, token: Address) -> SourceResult<bool> {
        self.check(TOKENS)?;
        Ok(self.tokens.get(&token).map(|t| t.has_code).unwrap_or(false))
    }

    async fn symbol(&self, token: Address) -> SourceResult<String> {
        self.check(TOKENS)?;
        match self.tokens.get(&token) {
            Some(t) => t.symbol.clone(),
            None => Err(SourceError::Reverted("symbol(): no code".to_string())),
        }
    }

    async fn decimals(&self, token: Address) -> SourceResult<U256> {
        self.check(TOKENS)?;
        match self.tokens.get(&token) {
            Some(t) => t.decimals.clone(),
            None => Err(SourceError::Reverted("decimals(): no code".to_string())),
        }
    }

    async fn balance_of(&self, token: Address, account: Address) -> SourceResult<U256> {
        self.check(TOKENS)?;
        Ok(self
            .balances
            .get(&(token, account))
            .map(|b| *b)
            .unwrap_or_else(U256::zero))
    }
}

#[async_trait]
impl PositionSource for MemoryLedger {
    async fn positions(&self, pool: Address, account: Address) -> SourceResult<Vec<PositionState>> {
        self.check(POSITIONS)?;
        Ok(self
            .positions
            .get(&(pool, account))
            .map(|p| p.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl AlmSource for MemoryLedger {
    async fn vault_for_pool(&self, pool: Address) -> SourceResult<Option<Address>> {
        self.check(ALM)?;
        Ok(self.alm_vaults.get(&pool).map(|v| *v))
    }

    async fn position(&self, vault: Address, account: Address) -> SourceResult<Option<PositionState>> {
        self.check(ALM)?;
        Ok(self.alm_positions.get(&(vault, account)).map(|p| p.clone()))
    }
}

#[async_trait]
impl RewardLedger for MemoryLedger {
    async fn first_epoch(&self, pool: Address) -> SourceResult<Option<u64>> {
        self.check(REWARDS)?;
        Ok(self.first_epochs.get(&pool).map(|e| *e))
    }

    async fn votes(&self, pool: Address, epoch_start: u64) -> SourceResult<U256> {
        self.check(REWARDS)?;
        Ok(self.votes.get(&(pool, epoch_start)).map(|v| *v).unwrap_or_else(U256::zero))
    }

    async fn emissions(&self, pool: Address, epoch_start: u64) -> SourceResult<U256> {
        self.check(REWARDS)?;
        Ok(self
            .emissions
            .get(&(pool, epoch_start))
            .map(|v| *v)
            .unwrap_or_else(U256::zero))
    }

    async fn bribe_entries(&self, pool: Address, window: EpochWindow) -> SourceResult<Vec<RawReward>> {
        self.check(REWARDS)?;
        Ok(in_window(self.bribes.get(&pool).as_deref(), window))
    }

    async fn fee_entries(&self, pool: Address, window: EpochWindow) -> SourceResult<Vec<RawReward>> {
        self.check(REWARDS)?;
        Ok(in_window(self.fees.get(&pool).as_deref(), window))
    }

    async fn earned(&self, reward_contract: Address, lock_id: u64) -> SourceResult<Vec<(Address, U256)>> {
        self.check(REWARDS)?;
        Ok(self
            .earned
            .get(&(reward_contract, lock_id))
            .map(|e| e.clone())
            .unwrap_or_default())
    }
}

fn in_window(entries: Option<&Vec<RawReward>>, window: EpochWindow) -> Vec<RawReward> {
    entries
        .map(|list| {
            list.iter()
                .filter(|r| window.contains(r.timestamp))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VotingEscrowSource for MemoryLedger {
    async fn token(&self) -> SourceResult<Address> {
        self.check(ESCROW)?;
        self.check(ESCROW_TOKEN)?;
        Ok(*self.ve_token.read().unwrap_or_else(|e| e.into_inner()))
    }

    async fn lock_count(&self) -> SourceResult<u64> {
        self.check(ESCROW)?;
        Ok(self.lock_count.load(Ordering::SeqCst))
    }

    async fn lock_by_id(&self, id: u64) -> SourceResult<Option<LockState>> {
        self.check(ESCROW)?;
        Ok(self.locks.get(&id).map(|l| l.clone()))
    }

    async fn locks_by_account(&self, account: Address) -> SourceResult<Vec<u64>> {
        self.check(ESCROW)?;
        let mut ids: Vec<u64> = self
            .locks
            .iter()
            .filter(|l| l.owner == account)
            .map(|l| l.id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn votes_of(&self, id: u64) -> SourceResult<Vec<(Address, U256)>> {
        self.check(ESCROW)?;
        Ok(self.lock_votes.get(&id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn claimable_rebase(&self, id: u64) -> SourceResult<U256> {
        self.check(ESCROW)?;
        Ok(self.rebases.get(&id).map(|r| *r).unwrap_or_else(U256::zero))
    }
}

#[async_trait]
impl RelaySource for MemoryLedger {
    async fn registries(&self) -> SourceResult<Vec<Address>> {
        self.check(RELAYS)?;
        Ok(self
            .relay_registries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn relays(&self, registry: Address) -> SourceResult<Vec<Address>> {
        self.check(RELAYS)?;
        Ok(self.relays.get(&registry).map(|r| r.clone()).unwrap_or_default())
    }

    async fn relay_state(&self, relay: Address) -> SourceResult<Option<RelayState>> {
        self.check(RELAYS)?;
        Ok(self.relay_states.get(&relay).map(|r| r.clone()))
    }
}

#[async_trait]
impl GovNftSource for MemoryLedger {
    async fn collections(&self) -> SourceResult<Vec<Address>> {
        self.check(GOVNFT)?;
        Ok(self
            .collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }

    async fn collection(&self, collection: Address) -> SourceResult<Option<CollectionState>> {
        self.check(GOVNFT)?;
        Ok(self.collection_states.get(&collection).map(|c| c.clone()))
    }

    async fn nft(&self, collection: Address, id: U256) -> SourceResult<Option<GovNftState>> {
        self.check(GOVNFT)?;
        Ok(self.nfts.get(&(collection, id)).map(|n| n.clone()))
    }

    async fn owned_ids(&self, collection: Address, account: Address) -> SourceResult<Vec<U256>> {
        self.check(GOVNFT)?;
        Ok(self.nft_ids(collection, |n| n.owner == account))
    }

    async fn minted_ids(&self, collection: Address, account: Address) -> SourceResult<Vec<U256>> {
        self.check(GOVNFT)?;
        Ok(self.nft_ids(collection, |n| n.minter == account))
    }
}

impl MemoryLedger {
    fn nft_ids(&self, collection: Address, pred: impl Fn(&GovNftState) -> bool) -> Vec<U256> {
        let mut ids: Vec<U256> = self
            .nfts
            .iter()
            .filter(|e| e.key().0 == collection && pred(e.value()))
            .map(|e| e.value().id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoolKind;

    fn pool(address: u64, factory: u64) -> PoolState {
        PoolState {
            address: Address::from_low_u64_be(address),
            factory: Address::from_low_u64_be(factory),
            token0: Address::from_low_u64_be(0xa0),
            token1: Address::from_low_u64_be(0xa1),
            kind: PoolKind::Volatile,
            symbol: Some("vAMM".to_string()),
            decimals: 18,
            liquidity: U256::zero(),
            reserve0: U256::zero(),
            reserve1: U256::zero(),
            tick: 0,
            sqrt_ratio: U256::zero(),
            pool_fee: 30,
            unstaked_fee: 0,
            token0_fees: U256::zero(),
            token1_fees: U256::zero(),
            nfpm: None,
        }
    }

    #[tokio::test]
    async fn test_factory_index_filters_global_order() {
        let ledger = MemoryLedger::new();
        ledger.add_pool(pool(1, 100));
        ledger.add_pool(pool(2, 200));
        ledger.add_pool(pool(3, 100));

        let factory = Address::from_low_u64_be(100);
        assert_eq!(ledger.factory_pool_count(factory).await.unwrap(), 2);
        let second = ledger.factory_pool_by_index(factory, 1).await.unwrap().unwrap();
        assert_eq!(second.address, Address::from_low_u64_be(3));
        assert!(ledger.factory_pool_by_index(factory, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_and_restore() {
        let ledger = MemoryLedger::new();
        ledger.fail(POOLS);
        assert!(matches!(PoolRegistry::count(&ledger).await, Err(SourceError::Unavailable(_))));
        ledger.restore(POOLS);
        assert_eq!(PoolRegistry::count(&ledger).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reward_window_is_half_open() {
        let ledger = MemoryLedger::new();
        let pool = Address::from_low_u64_be(1);
        for ts in [99, 100, 199, 200] {
            ledger.add_bribe(
                pool,
                RawReward {
                    token: Address::from_low_u64_be(7),
                    amount: U256::one(),
                    timestamp: ts,
                    source: Address::zero(),
                },
            );
        }
        let entries = ledger
            .bribe_entries(pool, EpochWindow { start: 100, end: 200 })
            .await
            .unwrap();
        let stamps: Vec<u64> = entries.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![100, 199]);
    }
}
