#![allow(dead_code)]

use ethers::types::{Address, H256, U256};
use std::sync::Arc;

use sugar_sdk::memory::{MemoryLedger, MemoryToken};
use sugar_sdk::pagination::Limits;
use sugar_sdk::sources::{FixedClock, GaugeState, PoolState};
use sugar_sdk::types::{PoolKind, FactoryRegistration, WEEK};
use sugar_sdk::{ChainTopology, Context, FactoryRegistry, Sources, Sugar};

/// Wednesday of epoch 100.
pub const NOW: u64 = 100 * WEEK + 2 * 24 * 3600;

pub fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub const OWNER: u64 = 0x0e;
pub const FACTORY_A: u64 = 0xfa;
pub const FACTORY_B: u64 = 0xfb;

pub const USDC: u64 = 0xa1;
pub const WETH: u64 = 0xa2;
pub const VELO: u64 = 0xa3;
pub const BROKEN: u64 = 0xa4;

pub const P0: u64 = 0x1000;
pub const P1: u64 = 0x1001;
pub const P2: u64 = 0x1002;

pub const GAUGE_P0: u64 = 0x2000;
pub const GAUGE_P1: u64 = 0x2001;
pub const FEE_P0: u64 = 0x3000;
pub const BRIBE_P0: u64 = 0x4000;
pub const FEE_P1: u64 = 0x3001;
pub const BRIBE_P1: u64 = 0x4001;

pub fn pool_state(address: u64, factory: u64, token0: u64, token1: u64, kind: PoolKind) -> PoolState {
    PoolState {
        address: addr(address),
        factory: addr(factory),
        token0: addr(token0),
        token1: addr(token1),
        kind,
        symbol: Some(format!("POOL-{:x}", address)),
        decimals: 18,
        liquidity: U256::from(1_000_000u64),
        reserve0: U256::from(500u64),
        reserve1: U256::from(700u64),
        tick: 0,
        sqrt_ratio: U256::zero(),
        pool_fee: 30,
        unstaked_fee: 0,
        token0_fees: U256::zero(),
        token1_fees: U256::zero(),
        nfpm: None,
    }
}

/// Three pools at indices 0, 1, 2:
///
/// - `P0`: factory A, volatile USDC/WETH, live gauge emitting VELO
/// - `P1`: factory B, concentrated WETH/VELO, live gauge
/// - `P2`: factory A, stable USDC/BROKEN, no gauge, unreadable symbol
pub fn ledger() -> Arc<MemoryLedger> {
    let ledger = MemoryLedger::new();

    ledger.add_token(addr(USDC), MemoryToken::erc20("USDC", 6));
    ledger.add_token(addr(WETH), MemoryToken::erc20("WETH", 18));
    ledger.add_token(addr(VELO), MemoryToken::erc20("VELO", 18));
    ledger.add_token(addr(BROKEN), MemoryToken::reverting());
    ledger.whitelist(addr(USDC));
    ledger.whitelist(addr(WETH));

    ledger.add_pool(pool_state(P0, FACTORY_A, USDC, WETH, PoolKind::Volatile));
    ledger.add_pool(pool_state(
        P1,
        FACTORY_B,
        WETH,
        VELO,
        PoolKind::Concentrated { tick_spacing: 100 },
    ));
    let mut p2 = pool_state(P2, FACTORY_A, USDC, BROKEN, PoolKind::Stable);
    p2.symbol = None;
    ledger.add_pool(p2);

    ledger.set_gauge(
        addr(P0),
        addr(GAUGE_P0),
        addr(FEE_P0),
        addr(BRIBE_P0),
        GaugeState {
            alive: true,
            emissions: U256::from(42u64),
            emissions_token: addr(VELO),
            liquidity: U256::from(900u64),
            staked0: U256::from(450u64),
            staked1: U256::from(630u64),
        },
    );
    ledger.set_gauge(
        addr(P1),
        addr(GAUGE_P1),
        addr(FEE_P1),
        addr(BRIBE_P1),
        GaugeState {
            alive: true,
            emissions_token: addr(VELO),
            ..GaugeState::default()
        },
    );

    Arc::new(ledger)
}

pub fn registration(pool_factory: u64, init_byte: u8) -> FactoryRegistration {
    FactoryRegistration {
        pool_factory: addr(pool_factory),
        gauge_factory: addr(pool_factory + 0x100),
        rewards_factory: addr(pool_factory + 0x200),
        init_code_hash: H256::repeat_byte(init_byte),
    }
}

pub fn registry() -> Arc<FactoryRegistry> {
    let registry = FactoryRegistry::new(addr(OWNER));
    registry
        .approve(addr(OWNER), registration(FACTORY_A, 0x11))
        .unwrap();
    registry
        .approve(addr(OWNER), registration(FACTORY_B, 0x22))
        .unwrap();
    Arc::new(registry)
}

pub fn context(topology: ChainTopology) -> Context {
    Context {
        topology,
        limits: Limits::default(),
        concurrency: 4,
        clock: Arc::new(FixedClock(NOW)),
    }
}

pub fn sugar_with(ledger: Arc<MemoryLedger>, registry: Arc<FactoryRegistry>, topology: ChainTopology) -> Sugar {
    Sugar::new(Sources::from_memory(ledger, registry), context(topology))
}

pub fn root_sugar(ledger: Arc<MemoryLedger>) -> Sugar {
    sugar_with(ledger, registry(), ChainTopology::Root)
}

pub fn leaf_sugar(ledger: Arc<MemoryLedger>) -> Sugar {
    sugar_with(ledger, registry(), ChainTopology::Leaf)
}
