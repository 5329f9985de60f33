use async_trait::async_trait;
use ethers::abi::{ParamType, Token as AbiToken};
use ethers::types::{Address, H256};
use indexmap::IndexMap;

use super::RpcClient;
use crate::error::SourceError;
use crate::sources::{FactoryRegistrySource, SourceResult};

/// On-chain factory registry.
///
/// The registry contract does not store init code hashes; they come from
/// configuration (`INIT_HASHES_<chain>` next to `FACTORIES_<chain>`).
#[derive(Clone)]
pub struct RegistryContract {
    rpc: RpcClient,
    registry: Address,
    init_hashes: IndexMap<Address, H256>,
}

impl RegistryContract {
    pub fn new(rpc: RpcClient, registry: Address) -> Self {
        Self {
            rpc,
            registry,
            init_hashes: IndexMap::new(),
        }
    }

    pub fn with_init_hashes(mut self, factories: &[Address], hashes: &[H256]) -> Self {
        self.init_hashes
            .extend(factories.iter().copied().zip(hashes.iter().copied()));
        self
    }
}

#[async_trait]
impl FactoryRegistrySource for RegistryContract {
    async fn pool_factories(&self) -> SourceResult<Vec<Address>> {
        let out = self
            .rpc
            .call_decode(
                self.registry,
                "poolFactories()",
                &[],
                &[ParamType::Array(Box::new(ParamType::Address))],
            )
            .await?;
        out.into_iter()
            .next()
            .and_then(AbiToken::into_array)
            .ok_or_else(|| SourceError::Malformed("poolFactories(): expected address[]".to_string()))?
            .into_iter()
            .map(|t| {
                t.into_address()
                    .ok_or_else(|| SourceError::Malformed("poolFactories(): expected address".to_string()))
            })
            .collect()
    }

    /// The contract answers `(votingRewardsFactory, gaugeFactory)` and reverts
    /// for unknown factories.
    async fn factories_to_pool_factory(&self, pool_factory: Address) -> SourceResult<(Address, Address)> {
        let out = self
            .rpc
            .call_decode(
                self.registry,
                "factoriesToPoolFactory(address)",
                &[AbiToken::Address(pool_factory)],
                &[ParamType::Address, ParamType::Address],
            )
            .await;
        match out {
            Ok(tokens) => {
                let gauge_factory = tokens
                    .get(1)
                    .cloned()
                    .and_then(AbiToken::into_address)
                    .unwrap_or_else(Address::zero);
                Ok((gauge_factory, pool_factory))
            }
            Err(SourceError::Reverted(_)) => Ok((Address::zero(), pool_factory)),
            Err(e) => Err(e),
        }
    }

    async fn init_hash_to_pool_factory(&self, pool_factory: Address) -> SourceResult<H256> {
        Ok(self
            .init_hashes
            .get(&pool_factory)
            .copied()
            .unwrap_or_else(H256::zero))
    }
}
