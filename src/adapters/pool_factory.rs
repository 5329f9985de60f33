use async_trait::async_trait;
use ethers::abi::{ParamType, Token as AbiToken};
use ethers::types::{Address, U256};
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::debug;
use std::ops::Range;

use super::{as_i32, RpcClient};
use crate::error::SourceError;
use crate::pagination::factory_slots;
use crate::sources::{PoolRegistry, PoolState, SourceResult};
use crate::types::PoolKind;

const DEFAULT_CONCURRENCY: usize = 16;

/// The per-factory `allPools` lists a global index walks over.
#[async_trait]
trait FactoryLists: Sync {
    async fn pool_count(&self, factory: Address) -> SourceResult<u64>;

    async fn pool_at(&self, factory: Address, index: u64) -> SourceResult<Option<PoolState>>;
}

/// Resolves a global index range, reading each factory's length once.
async fn pools_in_range<L: FactoryLists>(
    lists: &L,
    factories: &[Address],
    range: Range<u64>,
    concurrency: usize,
) -> SourceResult<Vec<PoolState>> {
    if range.is_empty() {
        return Ok(Vec::new());
    }
    let counts = try_join_all(factories.iter().map(|&factory| async move {
        lists.pool_count(factory).await.map(|count| (factory, count))
    }))
    .await?;

    let states: Vec<Option<PoolState>> = stream::iter(factory_slots(&counts, range))
        .map(|(factory, index)| lists.pool_at(factory, index))
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;
    Ok(states.into_iter().flatten().collect())
}

/// Pool registry backed by the `allPools` lists of a fixed set of factories.
///
/// The global index concatenates the factories in the order given, which is
/// the factory registry's registration order when built from it.
#[derive(Clone)]
pub struct PoolFactorySource {
    rpc: RpcClient,
    factories: Vec<Address>,
    concurrency: usize,
}

impl PoolFactorySource {
    pub fn new(rpc: RpcClient, factories: Vec<Address>) -> Self {
        Self {
            rpc,
            factories,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Pool lookups in flight while resolving a range.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    async fn factory_len(&self, factory: Address) -> SourceResult<u64> {
        let len = self.rpc.uint(factory, "allPoolsLength()", &[]).await?;
        Ok(len.low_u64())
    }

    async fn pool_state(&self, pool: Address, factory: Address) -> SourceResult<PoolState> {
        let (token0, token1, symbol, decimals) = futures::join!(
            self.rpc.address(pool, "token0()", &[]),
            self.rpc.address(pool, "token1()", &[]),
            self.rpc.call(pool, "symbol()", &[]),
            self.rpc.uint(pool, "decimals()", &[]),
        );
        let (token0, token1) = (token0?, token1?);
        let symbol = symbol.and_then(|raw| super::erc20::decode_symbol(&raw)).ok();

        // Only concentrated pools expose `tickSpacing()`.
        match self.rpc.int(pool, "tickSpacing()").await {
            Ok(tick_spacing) => {
                self.concentrated_state(pool, factory, token0, token1, symbol, tick_spacing)
                    .await
            }
            Err(e) if e.is_unavailable() => Err(e),
            Err(_) => {
                let decimals = decimals.map(|d| d.low_u32().min(255) as u8).unwrap_or(18);
                self.basic_state(pool, factory, token0, token1, symbol, decimals)
                    .await
            }
        }
    }

    async fn basic_state(
        &self,
        pool: Address,
        factory: Address,
        token0: Address,
        token1: Address,
        symbol: Option<String>,
        decimals: u8,
    ) -> SourceResult<PoolState> {
        let stable = self.rpc.boolean(pool, "stable()", &[]).await?;
        let fee_args = [AbiToken::Address(pool), AbiToken::Bool(stable)];
        let (reserves, supply, fee) = futures::join!(
            self.rpc.call_decode(
                pool,
                "getReserves()",
                &[],
                &[ParamType::Uint(256), ParamType::Uint(256), ParamType::Uint(256)],
            ),
            self.rpc.uint(pool, "totalSupply()", &[]),
            self.rpc.uint(
                factory,
                "getFee(address,bool)",
                &fee_args,
            ),
        );
        let reserves = reserves?;
        let word = |i: usize| reserves.get(i).cloned().and_then(AbiToken::into_uint);

        Ok(PoolState {
            address: pool,
            factory,
            token0,
            token1,
            kind: if stable { PoolKind::Stable } else { PoolKind::Volatile },
            symbol,
            decimals,
            liquidity: supply?,
            reserve0: word(0).unwrap_or_default(),
            reserve1: word(1).unwrap_or_default(),
            tick: 0,
            sqrt_ratio: U256::zero(),
            pool_fee: fee.map(|f| f.low_u32()).unwrap_or_else(|e| {
                debug!("getFee failed for {:?}: {}", pool, e);
                0
            }),
            unstaked_fee: 0,
            token0_fees: U256::zero(),
            token1_fees: U256::zero(),
            nfpm: None,
        })
    }

    async fn concentrated_state(
        &self,
        pool: Address,
        factory: Address,
        token0: Address,
        token1: Address,
        symbol: Option<String>,
        tick_spacing: i32,
    ) -> SourceResult<PoolState> {
        let balance_args = [AbiToken::Address(pool)];
        let (slot0, liquidity, fee, unstaked_fee, nfpm, gauge_fees, reserve0, reserve1) = futures::join!(
            self.rpc.call_decode(
                pool,
                "slot0()",
                &[],
                &[
                    ParamType::Uint(160),
                    ParamType::Int(24),
                    ParamType::Uint(16),
                    ParamType::Uint(16),
                    ParamType::Uint(16),
                    ParamType::Bool,
                ],
            ),
            self.rpc.uint(pool, "liquidity()", &[]),
            self.rpc.uint(pool, "fee()", &[]),
            self.rpc.uint(pool, "unstakedFee()", &[]),
            self.rpc.address(pool, "nft()", &[]),
            self.rpc.call_decode(pool, "gaugeFees()", &[], &[ParamType::Uint(128), ParamType::Uint(128)]),
            self.rpc.uint(token0, "balanceOf(address)", &balance_args),
            self.rpc.uint(token1, "balanceOf(address)", &balance_args),
        );
        let slot0 = slot0?;
        let sqrt_ratio = slot0.first().cloned().and_then(AbiToken::into_uint).unwrap_or_default();
        let tick = slot0
            .get(1)
            .cloned()
            .and_then(AbiToken::into_int)
            .map(as_i32)
            .ok_or_else(|| SourceError::Malformed("slot0(): missing tick".to_string()))?;
        let gauge_fees = gauge_fees.unwrap_or_default();
        let fees = |i: usize| gauge_fees.get(i).cloned().and_then(AbiToken::into_uint).unwrap_or_default();

        Ok(PoolState {
            address: pool,
            factory,
            token0,
            token1,
            kind: PoolKind::Concentrated { tick_spacing },
            symbol,
            decimals: 18,
            liquidity: liquidity?,
            reserve0: reserve0.unwrap_or_default(),
            reserve1: reserve1.unwrap_or_default(),
            tick,
            sqrt_ratio,
            pool_fee: fee?.low_u32(),
            unstaked_fee: unstaked_fee.map(|f| f.low_u32()).unwrap_or(0),
            token0_fees: fees(0),
            token1_fees: fees(1),
            nfpm: nfpm.ok().filter(|a| !a.is_zero()),
        })
    }
}

#[async_trait]
impl FactoryLists for PoolFactorySource {
    async fn pool_count(&self, factory: Address) -> SourceResult<u64> {
        self.factory_len(factory).await
    }

    async fn pool_at(&self, factory: Address, index: u64) -> SourceResult<Option<PoolState>> {
        self.factory_pool_by_index(factory, index).await
    }
}

#[async_trait]
impl PoolRegistry for PoolFactorySource {
    async fn count(&self) -> SourceResult<u64> {
        let counts = try_join_all(self.factories.iter().map(|f| self.factory_len(*f))).await?;
        Ok(counts.iter().sum())
    }

    async fn get_by_index(&self, index: u64) -> SourceResult<Option<PoolState>> {
        let range = index..index.saturating_add(1);
        Ok(pools_in_range(self, &self.factories, range, 1).await?.into_iter().next())
    }

    async fn get_range(&self, range: Range<u64>) -> SourceResult<Vec<PoolState>> {
        pools_in_range(self, &self.factories, range, self.concurrency).await
    }
    async fn get_by_address(&self, pool: Address) -> SourceResult<Option<PoolState>> {
        let factory = match self.rpc.address(pool, "factory()", &[]).await {
            Ok(factory) => factory,
            Err(SourceError::Unavailable(reason)) => return Err(SourceError::Unavailable(reason)),
            Err(_) => return Ok(None),
        };
        if !self.factories.contains(&factory) {
            return Ok(None);
        }
        self.pool_state(pool, factory).await.map(Some)
    }

    async fn factory_pool_count(&self, factory: Address) -> SourceResult<u64> {
        if !self.factories.contains(&factory) {
            return Ok(0);
        }
        self.factory_len(factory).await
    }

    async fn factory_pool_by_index(&self, factory: Address, index: u64) -> SourceResult<Option<PoolState>> {
        let pool = match self
            .rpc
            .address(factory, "allPools(uint256)", &[AbiToken::Uint(U256::from(index))])
            .await
        {
            Ok(pool) => pool,
            Err(SourceError::Reverted(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if pool.is_zero() {
            return Ok(None);
        }
        self.pool_state(pool, factory).await.map(Some)
    }
}
