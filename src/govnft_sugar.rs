//! Governance NFT aggregator.
//!
//! Governance NFTs are vesting positions minted by collections. Lookups are
//! scoped to one collection; `collections` lists them all.

use ethers::types::{Address, U256};
use futures::stream::{self, StreamExt};
use log::warn;
use std::sync::Arc;

use crate::error::{Result, SugarError};
use crate::metrics::record_aggregator_call;
use crate::sources::{GovNftSource, GovNftState};
use crate::sugar::{Context, Sources};
use crate::types::{or_zero, GovNft, GovNftCollection};

#[derive(Clone)]
pub struct GovNftSugar {
    source: Arc<dyn GovNftSource>,
    concurrency: usize,
}

impl GovNftSugar {
    pub fn new(sources: &Sources, context: &Context) -> Self {
        Self {
            source: sources.govnft.clone(),
            concurrency: context.concurrency,
        }
    }

    /// Collections in declaration order. Unreadable collections are skipped.
    pub async fn collections(&self) -> Result<Vec<GovNftCollection>> {
        record_aggregator_call("govnft.collections");
        let addresses = self
            .source
            .collections()
            .await
            .map_err(|e| SugarError::upstream("govnft", e))?;

        let collections: Vec<Option<GovNftCollection>> = stream::iter(addresses)
            .map(|address| async move {
                match self.source.collection(address).await {
                    Ok(Some(state)) => Some(GovNftCollection {
                        address,
                        owner: state.owner,
                        name: state.name,
                        symbol: state.symbol,
                        supply: state.supply,
                    }),
                    Ok(None) => None,
                    Err(e) => {
                        warn!("Skipping collection {:?}: {}", address, e);
                        None
                    }
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;
        Ok(collections.into_iter().flatten().collect())
    }

    pub async fn by_id(&self, id: U256, collection: Address) -> Result<GovNft> {
        record_aggregator_call("govnft.by_id");
        self.source
            .nft(collection, id)
            .await
            .map_err(|e| SugarError::upstream("govnft", e))?
            .map(|state| to_record(collection, state))
            .ok_or_else(|| SugarError::not_found("govnft", id))
    }

    /// NFTs of `collection` currently held by `account`, by ascending id.
    pub async fn owned(&self, account: Address, collection: Address) -> Result<Vec<GovNft>> {
        record_aggregator_call("govnft.owned");
        let ids = self
            .source
            .owned_ids(collection, account)
            .await
            .map_err(|e| SugarError::upstream("govnft", e))?;
        self.nfts(collection, ids).await
    }

    /// NFTs of `collection` minted by `account`, whoever holds them now.
    pub async fn minted(&self, account: Address, collection: Address) -> Result<Vec<GovNft>> {
        record_aggregator_call("govnft.minted");
        let ids = self
            .source
            .minted_ids(collection, account)
            .await
            .map_err(|e| SugarError::upstream("govnft", e))?;
        self.nfts(collection, ids).await
    }

    async fn nfts(&self, collection: Address, ids: Vec<U256>) -> Result<Vec<GovNft>> {
        let states: Vec<Option<GovNftState>> = stream::iter(ids)
            .map(|id| self.source.nft(collection, id))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SugarError::upstream("govnft", e))?;
        Ok(states
            .into_iter()
            .flatten()
            .map(|state| to_record(collection, state))
            .collect())
    }
}

fn to_record(collection: Address, state: GovNftState) -> GovNft {
    GovNft {
        id: state.id,
        address: collection,
        owner: state.owner,
        minter: state.minter,
        token: state.token,
        vault: state.vault,
        amount: state.amount,
        total_locked: state.total_locked,
        amount_claimed: state.amount_claimed,
        claimable: state.claimable,
        split_count: state.split_count,
        cliff_length: state.cliff_length,
        start: state.start,
        end: state.end,
        delegated: or_zero(state.delegated),
    }
}
