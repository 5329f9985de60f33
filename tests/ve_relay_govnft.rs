//! Vote-escrow, relay and governance NFT aggregators.

mod common;

use common::*;
use ethers::types::{Address, U256};
use sugar_sdk::memory::{MemoryLedger, MemoryToken, ESCROW_TOKEN, GOVNFT, RELAYS};
use sugar_sdk::sources::{CollectionState, EscrowType, GovNftState, LockState, RelayState};
use sugar_sdk::types::{RewardKind, WEEK};
use sugar_sdk::{Capability, Sources, Sugar, SugarError};
use std::sync::Arc;

const ALICE: u64 = 0xa11ce;
const BOB: u64 = 0xb0b;

fn lock(id: u64, owner: u64, voting_amount: u64, escrow_type: EscrowType) -> LockState {
    LockState {
        id,
        owner: addr(owner),
        amount: U256::from(voting_amount * 2),
        voting_amount: U256::from(voting_amount),
        expires_at: 200 * WEEK,
        permanent: false,
        voted_at: 0,
        delegate_id: None,
        managed_id: None,
        escrow_type,
    }
}

/// Locks 1 (Alice), 2 (Bob, managed), 3 (burned), 4 (Alice, deposited into 2).
fn escrow() -> Arc<MemoryLedger> {
    let ledger = ledger();
    ledger.set_ve_token(addr(VELO));
    ledger.add_lock(lock(1, ALICE, 50, EscrowType::Normal));
    ledger.add_lock(lock(2, BOB, 100, EscrowType::Managed));
    ledger.add_lock(lock(3, BOB, 1, EscrowType::Normal));
    ledger.burn_lock(3);
    ledger.add_lock(LockState {
        managed_id: Some(2),
        ..lock(4, ALICE, 20, EscrowType::Locked)
    });
    ledger
}

#[tokio::test]
async fn test_lock_by_id() {
    let sugar = root_sugar(escrow());

    let first = sugar.ve.by_id(1).await.unwrap();
    assert_eq!(first.account, addr(ALICE));
    assert_eq!(first.voting_power, U256::from(50u64));
    assert_eq!(first.token, addr(VELO));
    assert_eq!(first.decimals, 18);
    assert!(!first.managed);
    assert!(first.degraded.is_empty());

    assert!(matches!(sugar.ve.by_id(3).await, Err(SugarError::NotFound { .. })));
    assert!(matches!(sugar.ve.by_id(99).await, Err(SugarError::NotFound { .. })));
}

#[tokio::test]
async fn test_managed_locks_carry_no_voting_power() {
    let sugar = root_sugar(escrow());

    let managed = sugar.ve.by_id(2).await.unwrap();
    assert!(managed.managed);
    assert_eq!(managed.voting_amount, U256::from(100u64));
    assert_eq!(managed.voting_power, U256::zero());

    let deposited = sugar.ve.by_id(4).await.unwrap();
    assert!(!deposited.managed);
    assert_eq!(deposited.managed_id, 2);
    assert_eq!(deposited.voting_power, U256::zero());
}

#[tokio::test]
async fn test_all_skips_burned_ids() {
    let sugar = root_sugar(escrow());

    let ids: Vec<u64> = sugar.ve.all(10, 0).await.unwrap().iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![1, 2, 4]);

    // The scan passes burned id 3 and still fills the page.
    let ids: Vec<u64> = sugar.ve.all(2, 2).await.unwrap().iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![2, 4]);

    let last = sugar.ve.all(1, 3).await.unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].id, 4);

    assert!(sugar.ve.all(10, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_offset_starts_at_lock_id() {
    let sugar = root_sugar(escrow());

    // Id 0 never exists, so offsets 0 and 1 both start at lock 1.
    let first = sugar.ve.all(1, 0).await.unwrap();
    let second = sugar.ve.all(1, 1).await.unwrap();
    let by_id = sugar.ve.by_id(1).await.unwrap();
    assert_eq!(first, vec![by_id.clone()]);
    assert_eq!(second, vec![by_id]);
}

#[tokio::test]
async fn test_all_bounded_by_lock_ceiling() {
    let ledger = escrow();
    ledger.burn_lock(1);
    ledger.burn_lock(2);
    let mut ctx = context(sugar_sdk::ChainTopology::Root);
    ctx.limits.max_locks = 2;
    let sugar = Sugar::new(Sources::from_memory(ledger, registry()), ctx);

    // Ids 0 and 1 are looked up, then the scan stops.
    assert!(sugar.ve.all(2, 0).await.unwrap().is_empty());
    assert_eq!(sugar.ve.all(2, 3).await.unwrap()[0].id, 4);
}

#[tokio::test]
async fn test_locks_by_account() {
    let sugar = root_sugar(escrow());
    let ids: Vec<u64> = sugar
        .ve
        .by_account(addr(ALICE))
        .await
        .unwrap()
        .iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(ids, vec![1, 4]);
    assert!(sugar.ve.by_account(addr(0xdead)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreadable_escrow_token_degrades_decimals() {
    let ledger = escrow();
    ledger.add_token(addr(VELO), MemoryToken::reverting());
    let sugar = root_sugar(ledger);

    let lock = sugar.ve.by_id(1).await.unwrap();
    assert_eq!(lock.decimals, 0);
    assert_eq!(lock.degraded[0].field, "decimals");
}

#[tokio::test]
async fn test_lock_rewards() {
    let ledger = escrow();
    ledger.set_lock_votes(1, vec![(addr(P0), U256::from(10u64))]);
    ledger.set_earned(
        addr(FEE_P0),
        1,
        vec![(addr(USDC), U256::from(5u64)), (addr(WETH), U256::zero())],
    );
    ledger.set_earned(addr(BRIBE_P0), 1, vec![(addr(VELO), U256::from(7u64))]);
    ledger.set_rebase(1, U256::from(3u64));
    let sugar = root_sugar(ledger);

    let lock = sugar.ve.by_id(1).await.unwrap();
    assert_eq!(lock.votes.len(), 1);
    assert_eq!(lock.votes[0].lp, addr(P0));
    assert_eq!(lock.rebase_amount, U256::from(3u64));

    let rewards = sugar.ve.rewards(1).await.unwrap();
    let summary: Vec<(RewardKind, Address, U256)> =
        rewards.iter().map(|r| (r.kind, r.token, r.amount)).collect();
    assert_eq!(
        summary,
        vec![
            (RewardKind::Fee, addr(USDC), U256::from(5u64)),
            (RewardKind::Bribe, addr(VELO), U256::from(7u64)),
            (RewardKind::Rebase, addr(VELO), U256::from(3u64)),
        ]
    );
    assert_eq!(rewards[0].source, addr(FEE_P0));
    assert_eq!(rewards[2].lp, Address::zero());
    assert!(rewards.iter().all(|r| r.epoch == 100 * WEEK));

    assert!(sugar.ve.rewards(2).await.unwrap().is_empty());
    assert!(matches!(sugar.ve.rewards(3).await, Err(SugarError::NotFound { .. })));
}

#[tokio::test]
async fn test_rebase_skipped_when_escrow_token_unreadable() {
    let ledger = escrow();
    ledger.set_lock_votes(1, vec![(addr(P0), U256::from(10u64))]);
    ledger.set_earned(addr(BRIBE_P0), 1, vec![(addr(VELO), U256::from(7u64))]);
    ledger.set_rebase(1, U256::from(3u64));
    ledger.fail(ESCROW_TOKEN);
    let sugar = root_sugar(ledger);

    let rewards = sugar.ve.rewards(1).await.unwrap();
    assert_eq!(rewards.len(), 1);
    assert_eq!(rewards[0].kind, RewardKind::Bribe);
    assert_eq!(rewards[0].amount, U256::from(7u64));
}

#[tokio::test]
async fn test_escrow_is_root_only() {
    let sugar = leaf_sugar(escrow());
    assert!(matches!(
        sugar.ve.all(10, 0).await,
        Err(SugarError::Unsupported {
            capability: Capability::VoteEscrow,
            ..
        })
    ));
    assert!(matches!(sugar.ve.by_id(1).await, Err(SugarError::Unsupported { .. })));
}

// ---- relays ------------------------------------------------------------

const REGISTRY_1: u64 = 0x7001;
const REGISTRY_2: u64 = 0x7002;

fn relay(lock_id: u64, name: &str) -> RelayState {
    RelayState {
        lock_id,
        name: name.to_string(),
        manager: addr(0x3a3a),
        token: addr(VELO),
        balance: U256::from(lock_id * 1000),
        inactive: false,
    }
}

fn with_relays() -> Arc<MemoryLedger> {
    let ledger = escrow();
    ledger.add_relay(addr(REGISTRY_1), addr(0x8001), relay(2, "Bob compounder"));
    ledger.add_relay(addr(REGISTRY_1), addr(0x8002), relay(4, "Alice converter"));
    ledger.add_relay(addr(REGISTRY_2), addr(0x8003), relay(1, "Alice compounder"));
    ledger
}

#[tokio::test]
async fn test_relays_in_registry_order() {
    let sugar = root_sugar(with_relays());

    let relays = sugar.relay.all(Address::zero()).await.unwrap();
    let addresses: Vec<Address> = relays.iter().map(|r| r.address).collect();
    assert_eq!(addresses, vec![addr(0x8001), addr(0x8002), addr(0x8003)]);
    assert_eq!(relays[0].registry, addr(REGISTRY_1));
    assert_eq!(relays[2].registry, addr(REGISTRY_2));
    assert_eq!(relays[0].voting_amount, U256::from(100u64));
    assert_eq!(relays[0].name, "Bob compounder");
}

#[tokio::test]
async fn test_relays_filtered_by_lock_owner() {
    let sugar = root_sugar(with_relays());
    let mine: Vec<u64> = sugar
        .relay
        .all(addr(ALICE))
        .await
        .unwrap()
        .iter()
        .map(|r| r.lock_id)
        .collect();
    assert_eq!(mine, vec![4, 1]);
    assert!(sugar.relay.all(addr(0xdead)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_relay_registry() {
    let ledger = escrow();
    ledger.add_relay_registry(addr(REGISTRY_1));
    let sugar = root_sugar(ledger);
    assert!(sugar.relay.all(Address::zero()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_relay_registry_outage_aborts() {
    let ledger = with_relays();
    ledger.fail(RELAYS);
    let sugar = root_sugar(ledger);
    assert!(matches!(
        sugar.relay.all(Address::zero()).await,
        Err(SugarError::UpstreamUnavailable { origin: "relay_registry", .. })
    ));
}

// ---- governance NFTs ---------------------------------------------------

const COLLECTION: u64 = 0x9001;
const EMPTY_COLLECTION: u64 = 0x9002;

fn nft(id: u64, owner: u64, minter: u64) -> GovNftState {
    GovNftState {
        id: U256::from(id),
        owner: addr(owner),
        minter: addr(minter),
        token: addr(VELO),
        vault: addr(0x9900 + id),
        amount: U256::from(1000u64),
        total_locked: U256::from(1000u64),
        amount_claimed: U256::zero(),
        claimable: U256::from(10u64),
        split_count: 0,
        cliff_length: WEEK,
        start: 90 * WEEK,
        end: 150 * WEEK,
        delegated: None,
    }
}

fn with_collection() -> Arc<MemoryLedger> {
    let ledger = ledger();
    ledger.add_collection(
        addr(COLLECTION),
        CollectionState {
            owner: addr(BOB),
            name: "Team vesting".to_string(),
            symbol: "GOV".to_string(),
            supply: U256::from(2u64),
        },
    );
    ledger.add_collection(
        addr(EMPTY_COLLECTION),
        CollectionState {
            owner: addr(BOB),
            name: "Grants".to_string(),
            symbol: "GRANT".to_string(),
            supply: U256::zero(),
        },
    );
    ledger.add_govnft(addr(COLLECTION), nft(1, ALICE, BOB));
    ledger.add_govnft(addr(COLLECTION), nft(2, BOB, BOB));
    ledger
}

#[tokio::test]
async fn test_collections_listing() {
    let sugar = root_sugar(with_collection());
    let collections = sugar.govnft.collections().await.unwrap();
    assert_eq!(collections.len(), 2);
    assert_eq!(collections[0].address, addr(COLLECTION));
    assert_eq!(collections[0].symbol, "GOV");
    assert_eq!(collections[1].supply, U256::zero());
}

#[tokio::test]
async fn test_govnft_lookups() {
    let sugar = root_sugar(with_collection());
    let collection = addr(COLLECTION);

    let first = sugar.govnft.by_id(U256::one(), collection).await.unwrap();
    assert_eq!(first.owner, addr(ALICE));
    assert_eq!(first.address, collection);
    assert_eq!(first.delegated, Address::zero());

    assert!(matches!(
        sugar.govnft.by_id(U256::from(3u64), collection).await,
        Err(SugarError::NotFound { .. })
    ));

    let owned: Vec<U256> = sugar
        .govnft
        .owned(addr(ALICE), collection)
        .await
        .unwrap()
        .iter()
        .map(|n| n.id)
        .collect();
    assert_eq!(owned, vec![U256::one()]);

    let minted = sugar.govnft.minted(addr(BOB), collection).await.unwrap();
    assert_eq!(minted.len(), 2);
    assert!(sugar
        .govnft
        .owned(addr(ALICE), addr(EMPTY_COLLECTION))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_govnft_outage_aborts() {
    let ledger = with_collection();
    ledger.fail(GOVNFT);
    let sugar = leaf_sugar(ledger);
    assert!(matches!(
        sugar.govnft.collections().await,
        Err(SugarError::UpstreamUnavailable { origin: "govnft", .. })
    ));
}
