//! # Pool aggregator
//!
//! Builds [`Pool`] records from the pool registry and the voter, projects them
//! for routing, lists the tokens they reference and collects account positions
//! across factories.
//!
//! ## Failure policy
//!
//! - The pool registry (and the factory registry for fan-outs) is the primary
//!   source: a failure there aborts the call with `UpstreamUnavailable`.
//! - Gauge, fee, bribe, ALM and root lookups are secondary. A failure yields the
//!   zero address plus a [`Degradation`] on the pool.
//! - One factory whose pool count cannot be read contributes no pools to a
//!   `positions` fan-out instead of aborting it.
//!
//! ## Ordering
//!
//! Every fan-out uses `buffered`, so results come back in index order no matter
//! which lookup finishes first.

use ethers::types::Address;
use futures::stream::{self, StreamExt, TryStreamExt};
use indexmap::IndexSet;
use log::{debug, warn};
use std::sync::Arc;

use crate::chain::{Capability, ChainTopology};
use crate::error::{Degradation, Result, SugarError};
use crate::metrics::{record_aggregator_call, record_degraded};
use crate::pagination::{check_limit, factory_slots, paginate, Limits};
use crate::root_pool::root_pool_address;
use crate::sources::{
    AlmSource, FactoryRegistrySource, GaugeState, PoolRegistry, PoolState, PositionSource,
    PositionState, SourceResult, VoterSource,
};
use crate::sugar::{Context, Sources};
use crate::token_resolver::{TokenResolver, PLACEHOLDER_SYMBOL};
use crate::types::{or_zero, Pool, PoolSwapView, Position, Token};

#[derive(Clone)]
pub struct LpSugar {
    pools: Arc<dyn PoolRegistry>,
    voter: Arc<dyn VoterSource>,
    positions: Arc<dyn PositionSource>,
    alm: Arc<dyn AlmSource>,
    registry: Arc<dyn FactoryRegistrySource>,
    resolver: TokenResolver,
    topology: ChainTopology,
    limits: Limits,
    concurrency: usize,
}

impl LpSugar {
    pub fn new(sources: &Sources, context: &Context) -> Self {
        Self {
            pools: sources.pools.clone(),
            voter: sources.voter.clone(),
            positions: sources.positions.clone(),
            alm: sources.alm.clone(),
            registry: sources.registry.clone(),
            resolver: context.resolver(sources),
            topology: context.topology,
            limits: context.limits,
            concurrency: context.concurrency,
        }
    }

    /// Number of pools in the global index.
    pub async fn count(&self) -> Result<u64> {
        self.pools.count().await.map_err(|e| SugarError::upstream("pool_registry", e))
    }

    pub async fn by_index(&self, index: u64) -> Result<Pool> {
        record_aggregator_call("lp.by_index");
        let state = self
            .pools
            .get_by_index(index)
            .await
            .map_err(|e| SugarError::upstream("pool_registry", e))?
            .ok_or_else(|| SugarError::not_found("pool", index))?;
        Ok(self.assemble(state).await)
    }

    pub async fn by_address(&self, lp: Address) -> Result<Pool> {
        record_aggregator_call("lp.by_address");
        let state = self
            .pools
            .get_by_address(lp)
            .await
            .map_err(|e| SugarError::upstream("pool_registry", e))?
            .ok_or_else(|| SugarError::not_found("pool", format!("{:?}", lp)))?;
        Ok(self.assemble(state).await)
    }

    /// Pools `[offset, offset + limit)` in registry index order.
    pub async fn all(&self, limit: u64, offset: u64) -> Result<Vec<Pool>> {
        record_aggregator_call("lp.all");
        let states = self.page_states(limit, offset).await?;
        Ok(stream::iter(states)
            .map(|state| self.assemble(state))
            .buffered(self.concurrency)
            .collect()
            .await)
    }

    /// Routing projection of [`all`](Self::all). Skips every voter lookup.
    pub async fn for_swaps(&self, limit: u64, offset: u64) -> Result<Vec<PoolSwapView>> {
        record_aggregator_call("lp.for_swaps");
        let states = self.page_states(limit, offset).await?;
        Ok(states.iter().map(PoolSwapView::from).collect())
    }

    /// Distinct tokens referenced by the pool page: `token0`, `token1` and the
    /// gauge's emissions token, in first-appearance order. Resolved for
    /// `account` (balance and whitelist flag).
    pub async fn tokens(
        &self,
        limit: u64,
        offset: u64,
        account: Address,
        exclusions: &[Address],
    ) -> Result<Vec<Token>> {
        record_aggregator_call("lp.tokens");
        let states = self.page_states(limit, offset).await?;

        let emissions_tokens: Vec<Address> = stream::iter(&states)
            .map(|state| self.emissions_token(state.address))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut seen: IndexSet<Address> = IndexSet::new();
        for (state, emissions_token) in states.iter().zip(emissions_tokens) {
            seen.insert(state.token0);
            seen.insert(state.token1);
            if !emissions_token.is_zero() {
                seen.insert(emissions_token);
            }
        }

        let wanted: Vec<Address> = seen
            .into_iter()
            .filter(|token| !exclusions.contains(token))
            .take(self.limits.max_tokens as usize)
            .collect();
        Ok(self.resolver.resolve_many_for(&wanted, &[], account).await)
    }

    /// Positions of `account` in pools `[offset, offset + limit)` of one factory.
    pub async fn positions_by_factory(
        &self,
        limit: u64,
        offset: u64,
        account: Address,
        factory: Address,
    ) -> Result<Vec<Position>> {
        record_aggregator_call("lp.positions_by_factory");
        check_account(account)?;
        check_limit(limit, self.limits.max_positions)?;

        let total = self
            .pools
            .factory_pool_count(factory)
            .await
            .map_err(|e| SugarError::upstream("pool_registry", e))?;
        let range = paginate(total, limit, offset, self.limits.max_positions)?;
        let slots: Vec<(Address, u64)> = range.map(|i| (factory, i)).collect();

        let states = self.slot_states(slots).await?;
        self.collect_positions(states, account, false).await
    }

    /// Positions of `account` across every registered factory. Pages run over
    /// the concatenated pool lists (registration order, then pool order).
    pub async fn positions(&self, limit: u64, offset: u64, account: Address) -> Result<Vec<Position>> {
        record_aggregator_call("lp.positions");
        check_account(account)?;
        check_limit(limit, self.limits.max_positions)?;

        let states = self.fan_out_states(limit, offset).await?;
        self.collect_positions(states, account, false).await
    }

    /// Concentrated positions of `account` that are not staked in a gauge.
    pub async fn positions_unstaked_concentrated(
        &self,
        limit: u64,
        offset: u64,
        account: Address,
    ) -> Result<Vec<Position>> {
        record_aggregator_call("lp.positions_unstaked_concentrated");
        self.topology.require(Capability::UnstakedConcentratedPositions)?;
        check_account(account)?;
        check_limit(limit, self.limits.max_positions)?;

        let states = self.fan_out_states(limit, offset).await?;
        self.collect_positions(states, account, true).await
    }

    async fn page_states(&self, limit: u64, offset: u64) -> Result<Vec<PoolState>> {
        check_limit(limit, self.limits.max_lps)?;
        let total = self.count().await?;
        let range = paginate(total, limit, offset, self.limits.max_lps)?;

        // An index can vanish between `count` and the lookup; read skew is accepted.
        self.pools
            .get_range(range)
            .await
            .map_err(|e| SugarError::upstream("pool_registry", e))
    }

    async fn fan_out_states(&self, limit: u64, offset: u64) -> Result<Vec<PoolState>> {
        let factories = self
            .registry
            .pool_factories()
            .await
            .map_err(|e| SugarError::upstream("factory_registry", e))?;

        let counts: Vec<(Address, u64)> = stream::iter(factories)
            .map(|factory| async move {
                match self.pools.factory_pool_count(factory).await {
                    Ok(count) => (factory, count),
                    Err(e) => {
                        warn!("Skipping factory {:?}: pool count unavailable ({})", factory, e);
                        record_degraded("factory_pool_count");
                        (factory, 0)
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let total: u64 = counts.iter().map(|(_, c)| *c).sum();
        let range = paginate(total, limit, offset, self.limits.max_positions)?;
        self.slot_states(factory_slots(&counts, range)).await
    }

    async fn slot_states(&self, slots: Vec<(Address, u64)>) -> Result<Vec<PoolState>> {
        let states: Vec<Option<PoolState>> = stream::iter(slots)
            .map(|(factory, index)| self.pools.factory_pool_by_index(factory, index))
            .buffered(self.concurrency)
            .try_collect()
            .await
            .map_err(|e| SugarError::upstream("pool_registry", e))?;
        Ok(states.into_iter().flatten().collect())
    }

    async fn collect_positions(
        &self,
        states: Vec<PoolState>,
        account: Address,
        unstaked_concentrated_only: bool,
    ) -> Result<Vec<Position>> {
        let per_pool: Vec<Vec<Position>> = stream::iter(states)
            .map(|state| self.pool_positions(state, account, unstaked_concentrated_only))
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        Ok(per_pool.into_iter().flatten().collect())
    }

    async fn pool_positions(
        &self,
        state: PoolState,
        account: Address,
        unstaked_concentrated_only: bool,
    ) -> Result<Vec<Position>> {
        let lp = state.address;
        if unstaked_concentrated_only {
            if !state.kind.is_concentrated() {
                return Ok(Vec::new());
            }
            let raw = self
                .positions
                .positions(lp, account)
                .await
                .map_err(|e| SugarError::upstream("positions", e))?;
            return Ok(raw
                .into_iter()
                .filter(|p| !p.staked)
                .map(|p| to_position(lp, account, p, Address::zero()))
                .collect());
        }

        let (raw, alm) = futures::join!(
            self.positions.positions(lp, account),
            self.alm_position(lp, account)
        );
        let mut out: Vec<Position> = raw
            .map_err(|e| SugarError::upstream("positions", e))?
            .into_iter()
            .map(|p| to_position(lp, account, p, Address::zero()))
            .collect();
        if let Some((vault, p)) = alm {
            out.push(to_position(lp, account, p, vault));
        }
        Ok(out)
    }

    async fn alm_position(&self, lp: Address, account: Address) -> Option<(Address, PositionState)> {
        if !self.topology.supports(Capability::AlmPositions) {
            return None;
        }
        let vault = match self.alm.vault_for_pool(lp).await {
            Ok(Some(vault)) => vault,
            Ok(None) => return None,
            Err(e) => {
                warn!("ALM vault lookup failed for {:?}: {}", lp, e);
                return None;
            }
        };
        match self.alm.position(vault, account).await {
            Ok(position) => position.map(|p| (vault, p)),
            Err(e) => {
                warn!("ALM position lookup failed for vault {:?}: {}", vault, e);
                None
            }
        }
    }

    async fn emissions_token(&self, lp: Address) -> Address {
        let gauge = match self.voter.gauge_for_pool(lp).await {
            Ok(Some(gauge)) => gauge,
            Ok(None) => return Address::zero(),
            Err(e) => {
                debug!("No gauge for {:?} while listing tokens: {}", lp, e);
                return Address::zero();
            }
        };
        match self.voter.gauge_state(gauge).await {
            Ok(state) => state.map(|s| s.emissions_token).unwrap_or_else(Address::zero),
            Err(e) => {
                debug!("Gauge {:?} unreadable while listing tokens: {}", gauge, e);
                Address::zero()
            }
        }
    }

    async fn alm_vault(&self, lp: Address) -> SourceResult<Option<Address>> {
        if !self.topology.supports(Capability::AlmPositions) {
            return Ok(None);
        }
        self.alm.vault_for_pool(lp).await
    }

    /// Root chains are their own root.
    async fn root_address(&self, state: &PoolState) -> SourceResult<Option<Address>> {
        if self.topology.is_root() {
            return Ok(None);
        }
        let init_hash = self.registry.init_hash_to_pool_factory(state.factory).await?;
        Ok(root_pool_address(
            state.factory,
            init_hash,
            state.token0,
            state.token1,
            state.kind,
        ))
    }

    async fn assemble(&self, state: PoolState) -> Pool {
        let lp = state.address;
        let mut degraded = Vec::new();

        let (gauge, fee, bribe, alm, root) = futures::join!(
            self.voter.gauge_for_pool(lp),
            self.voter.fee_contract_for_pool(lp),
            self.voter.bribe_contract_for_pool(lp),
            self.alm_vault(lp),
            self.root_address(&state),
        );
        let gauge = sentinel(gauge, "gauge", &mut degraded);
        let fee = sentinel(fee, "fee", &mut degraded);
        let bribe = sentinel(bribe, "bribe", &mut degraded);
        let alm = sentinel(alm, "alm", &mut degraded);
        let root = sentinel(root, "root", &mut degraded);

        let gauge_state = if gauge.is_zero() {
            GaugeState::default()
        } else {
            match self.voter.gauge_state(gauge).await {
                Ok(state) => state.unwrap_or_default(),
                Err(e) => {
                    degraded.push(Degradation::new("gauge_state", e));
                    GaugeState::default()
                }
            }
        };

        let symbol = match state.symbol {
            Some(symbol) => symbol,
            None => {
                degraded.push(Degradation::new("symbol", "pool symbol unavailable"));
                PLACEHOLDER_SYMBOL.to_string()
            }
        };

        if !degraded.is_empty() {
            debug!("Pool {:?} assembled with fallbacks: {:?}", lp, degraded);
        }

        Pool {
            lp,
            symbol,
            decimals: state.decimals,
            liquidity: state.liquidity,
            kind: state.kind,
            tick: state.tick,
            sqrt_ratio: state.sqrt_ratio,
            token0: state.token0,
            reserve0: state.reserve0,
            staked0: gauge_state.staked0,
            token1: state.token1,
            reserve1: state.reserve1,
            staked1: gauge_state.staked1,
            gauge,
            gauge_liquidity: gauge_state.liquidity,
            gauge_alive: gauge_state.alive,
            fee,
            bribe,
            factory: state.factory,
            emissions: gauge_state.emissions,
            emissions_token: gauge_state.emissions_token,
            pool_fee: state.pool_fee,
            unstaked_fee: state.unstaked_fee,
            token0_fees: state.token0_fees,
            token1_fees: state.token1_fees,
            nfpm: or_zero(state.nfpm),
            alm,
            root,
            degraded,
        }
    }
}

impl From<&PoolState> for PoolSwapView {
    fn from(state: &PoolState) -> Self {
        Self {
            lp: state.address,
            kind: state.kind,
            token0: state.token0,
            token1: state.token1,
            factory: state.factory,
            pool_fee: state.pool_fee,
        }
    }
}

fn check_account(account: Address) -> Result<()> {
    if account.is_zero() {
        return Err(SugarError::InvalidArgument(
            "account cannot be the zero address".to_string(),
        ));
    }
    Ok(())
}

fn sentinel(
    lookup: SourceResult<Option<Address>>,
    field: &'static str,
    degraded: &mut Vec<Degradation>,
) -> Address {
    match lookup {
        Ok(addr) => or_zero(addr),
        Err(e) => {
            degraded.push(Degradation::new(field, e));
            Address::zero()
        }
    }
}

fn to_position(lp: Address, account: Address, p: PositionState, alm: Address) -> Position {
    Position {
        id: p.id,
        lp,
        account,
        liquidity: p.liquidity,
        staked: p.staked,
        amount0: p.amount0,
        amount1: p.amount1,
        staked0: p.staked0,
        staked1: p.staked1,
        unstaked_earned0: p.unstaked_earned0,
        unstaked_earned1: p.unstaked_earned1,
        emissions_earned: p.emissions_earned,
        tick_lower: p.tick_lower,
        tick_upper: p.tick_upper,
        alm,
    }
}
