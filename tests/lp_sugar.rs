//! Pool aggregator against the in-memory ledger.

mod common;

use common::*;
use ethers::types::{Address, H256, U256};
use sugar_sdk::memory::{POOLS, VOTER};
use sugar_sdk::root_pool::root_pool_address;
use sugar_sdk::sources::PositionState;
use sugar_sdk::token_resolver::PLACEHOLDER_SYMBOL;
use sugar_sdk::types::PoolKind;
use sugar_sdk::{Capability, SugarError};

const ACCOUNT: u64 = 0xacc;
const VAULT: u64 = 0x5000;

fn position(id: u64, liquidity: u64, staked: bool) -> PositionState {
    PositionState {
        id: U256::from(id),
        liquidity: U256::from(liquidity),
        staked,
        ..PositionState::default()
    }
}

fn with_positions() -> std::sync::Arc<sugar_sdk::MemoryLedger> {
    let ledger = ledger();
    let account = addr(ACCOUNT);
    ledger.add_position(addr(P0), account, position(0, 10, false));
    ledger.add_position(addr(P1), account, position(7, 70, true));
    ledger.add_position(addr(P1), account, position(8, 80, false));
    ledger.add_position(addr(P2), account, position(0, 5, false));
    ledger.set_alm_vault(addr(P1), addr(VAULT));
    ledger.set_alm_position(addr(VAULT), account, position(0, 33, true));
    ledger
}

#[tokio::test]
async fn test_all_returns_requested_slice() {
    let sugar = root_sugar(ledger());

    let page = sugar.lp.all(1, 1).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].lp, addr(P1));

    assert!(sugar.lp.all(10, 3).await.unwrap().is_empty());
    assert!(sugar.lp.all(10, u64::MAX).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pages_concatenate() {
    let sugar = root_sugar(ledger());

    let first = sugar.lp.all(1, 0).await.unwrap();
    let second = sugar.lp.all(1, 1).await.unwrap();
    let both = sugar.lp.all(2, 0).await.unwrap();
    assert_eq!(itertools::concat(vec![first, second]), both);
}

#[tokio::test]
async fn test_index_and_address_agree() {
    let sugar = root_sugar(ledger());
    for index in 0..3 {
        let by_index = sugar.lp.by_index(index).await.unwrap();
        let by_address = sugar.lp.by_address(by_index.lp).await.unwrap();
        assert_eq!(by_index, by_address);
    }
}

#[tokio::test]
async fn test_unknown_pool_is_not_found() {
    let sugar = root_sugar(ledger());
    assert!(matches!(sugar.lp.by_index(3).await, Err(SugarError::NotFound { .. })));
    assert!(matches!(
        sugar.lp.by_address(addr(0xdead)).await,
        Err(SugarError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_for_swaps_projection() {
    let sugar = root_sugar(ledger());
    let swaps = sugar.lp.for_swaps(10, 0).await.unwrap();
    let lps: Vec<Address> = swaps.iter().map(|s| s.lp).collect();
    assert!(lps.contains(&addr(P0)));
    assert!(lps.contains(&addr(P1)));
    assert_eq!(swaps[1].kind, PoolKind::Concentrated { tick_spacing: 100 });
    assert_eq!(swaps[0].factory, addr(FACTORY_A));
}

#[tokio::test]
async fn test_gauge_fields_and_sentinels() {
    let sugar = root_sugar(ledger());
    let pools = sugar.lp.all(10, 0).await.unwrap();

    let p0 = &pools[0];
    assert_eq!(p0.gauge, addr(GAUGE_P0));
    assert_eq!(p0.fee, addr(FEE_P0));
    assert_eq!(p0.bribe, addr(BRIBE_P0));
    assert!(p0.gauge_alive);
    assert_eq!(p0.emissions, U256::from(42u64));
    assert_eq!(p0.emissions_token, addr(VELO));
    assert_eq!(p0.staked0, U256::from(450u64));
    assert!(p0.degraded.is_empty());

    // No gauge: zero sentinels without a degradation for them.
    let p2 = &pools[2];
    assert_eq!(p2.gauge, Address::zero());
    assert_eq!(p2.fee, Address::zero());
    assert_eq!(p2.bribe, Address::zero());
    assert!(!p2.gauge_alive);
    assert_eq!(p2.symbol, PLACEHOLDER_SYMBOL);
    assert_eq!(p2.degraded.len(), 1);
    assert_eq!(p2.degraded[0].field, "symbol");
}

#[tokio::test]
async fn test_voter_outage_degrades_instead_of_failing() {
    let ledger = ledger();
    ledger.fail(VOTER);
    let sugar = root_sugar(ledger);

    let pools = sugar.lp.all(10, 0).await.unwrap();
    assert_eq!(pools.len(), 3);
    for pool in &pools {
        assert_eq!(pool.gauge, Address::zero());
        let fields: Vec<&str> = pool.degraded.iter().map(|d| d.field).collect();
        assert!(fields.contains(&"gauge"));
        assert!(fields.contains(&"fee"));
        assert!(fields.contains(&"bribe"));
    }
}

#[tokio::test]
async fn test_registry_outage_aborts() {
    let ledger = ledger();
    ledger.fail(POOLS);
    let sugar = root_sugar(ledger);
    assert!(matches!(
        sugar.lp.all(10, 0).await,
        Err(SugarError::UpstreamUnavailable { origin: "pool_registry", .. })
    ));
}

#[tokio::test]
async fn test_page_size_validation() {
    let sugar = root_sugar(ledger());
    assert!(matches!(sugar.lp.all(0, 0).await, Err(SugarError::InvalidArgument(_))));
    assert!(matches!(sugar.lp.all(1001, 0).await, Err(SugarError::InvalidArgument(_))));
    assert!(matches!(
        sugar.lp.positions(201, 0, addr(ACCOUNT)).await,
        Err(SugarError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_root_address_only_on_leaf_chains() {
    let expected = root_pool_address(
        addr(FACTORY_A),
        H256::repeat_byte(0x11),
        addr(USDC),
        addr(WETH),
        PoolKind::Volatile,
    )
    .unwrap();

    let leaf = leaf_sugar(ledger()).lp.by_index(0).await.unwrap();
    assert_eq!(leaf.root, expected);
    assert_ne!(leaf.root, Address::zero());

    let root = root_sugar(ledger()).lp.by_index(0).await.unwrap();
    assert_eq!(root.root, Address::zero());
}

#[tokio::test]
async fn test_tokens_listing() {
    let ledger = ledger();
    let account = addr(ACCOUNT);
    ledger.set_balance(addr(USDC), account, U256::from(1234u64));
    let sugar = root_sugar(ledger);

    let tokens = sugar.lp.tokens(10, 0, account, &[addr(WETH)]).await.unwrap();
    let listed: Vec<Address> = tokens.iter().map(|t| t.token_address).collect();
    assert_eq!(listed, vec![addr(USDC), addr(VELO), addr(BROKEN)]);

    assert_eq!(tokens[0].symbol, "USDC");
    assert_eq!(tokens[0].decimals, 6);
    assert_eq!(tokens[0].account_balance, U256::from(1234u64));
    assert!(tokens[0].listed);
    assert!(!tokens[1].listed);

    assert_eq!(tokens[2].symbol, PLACEHOLDER_SYMBOL);
    assert_eq!(tokens[2].decimals, 0);
    assert!(tokens[2].status.is_degraded());
}

#[tokio::test]
async fn test_positions_follow_registration_order() {
    let sugar = root_sugar(with_positions());
    let account = addr(ACCOUNT);

    let all = sugar.lp.positions(10, 0, account).await.unwrap();
    let lps: Vec<Address> = all.iter().map(|p| p.lp).collect();
    // Factory A holds P0 and P2, factory B holds P1 (+ its ALM position).
    assert_eq!(lps, vec![addr(P0), addr(P2), addr(P1), addr(P1), addr(P1)]);
    assert!(all.iter().all(|p| p.account == account));

    let second_pool = sugar.lp.positions(1, 1, account).await.unwrap();
    assert_eq!(second_pool.len(), 1);
    assert_eq!(second_pool[0].lp, addr(P2));
}

#[tokio::test]
async fn test_alm_positions_on_root_only() {
    let account = addr(ACCOUNT);

    let root = root_sugar(with_positions())
        .lp
        .positions_by_factory(10, 0, account, addr(FACTORY_B))
        .await
        .unwrap();
    assert_eq!(root.len(), 3);
    assert_eq!(root[2].alm, addr(VAULT));
    assert_eq!(root[2].liquidity, U256::from(33u64));
    assert!(root[..2].iter().all(|p| p.alm.is_zero()));

    let leaf = leaf_sugar(with_positions())
        .lp
        .positions_by_factory(10, 0, account, addr(FACTORY_B))
        .await
        .unwrap();
    assert_eq!(leaf.len(), 2);
    assert!(leaf.iter().all(|p| p.alm.is_zero()));
}

#[tokio::test]
async fn test_unstaked_concentrated_positions() {
    let account = addr(ACCOUNT);

    let positions = root_sugar(with_positions())
        .lp
        .positions_unstaked_concentrated(10, 0, account)
        .await
        .unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].id, U256::from(8u64));
    assert!(!positions[0].staked);

    let err = leaf_sugar(with_positions())
        .lp
        .positions_unstaked_concentrated(10, 0, account)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SugarError::Unsupported {
            capability: Capability::UnstakedConcentratedPositions,
            ..
        }
    ));
}

#[tokio::test]
async fn test_positions_reject_zero_account() {
    let sugar = root_sugar(with_positions());
    assert!(matches!(
        sugar.lp.positions(10, 0, Address::zero()).await,
        Err(SugarError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_unapproved_factory_drops_out_of_fan_out() {
    let ledger = with_positions();
    let registry = registry();
    registry.unapprove(addr(OWNER), addr(FACTORY_A)).unwrap();
    let sugar = sugar_with(ledger, registry, sugar_sdk::ChainTopology::Leaf);

    let lps: Vec<Address> = sugar
        .lp
        .positions(10, 0, addr(ACCOUNT))
        .await
        .unwrap()
        .iter()
        .map(|p| p.lp)
        .collect();
    assert_eq!(lps, vec![addr(P1), addr(P1)]);
}
