use async_trait::async_trait;
use ethers::abi::Token as AbiToken;
use ethers::types::Address;

use super::RpcClient;
use crate::sources::{GaugeState, SourceResult, VoterSource};

/// Voter contract lookups. Staked reserves are not derived here and stay zero.
#[derive(Clone)]
pub struct VoterContract {
    rpc: RpcClient,
    voter: Address,
}

impl VoterContract {
    pub fn new(rpc: RpcClient, voter: Address) -> Self {
        Self { rpc, voter }
    }

    async fn reward_contract(&self, pool: Address, signature: &str) -> SourceResult<Option<Address>> {
        let Some(gauge) = self.gauge_for_pool(pool).await? else {
            return Ok(None);
        };
        let contract = self
            .rpc
            .address(self.voter, signature, &[AbiToken::Address(gauge)])
            .await?;
        Ok(Some(contract).filter(|a| !a.is_zero()))
    }
}

#[async_trait]
impl VoterSource for VoterContract {
    async fn gauge_for_pool(&self, pool: Address) -> SourceResult<Option<Address>> {
        let gauge = self
            .rpc
            .address(self.voter, "gauges(address)", &[AbiToken::Address(pool)])
            .await?;
        Ok(Some(gauge).filter(|a| !a.is_zero()))
    }

    async fn fee_contract_for_pool(&self, pool: Address) -> SourceResult<Option<Address>> {
        self.reward_contract(pool, "gaugeToFees(address)").await
    }

    async fn bribe_contract_for_pool(&self, pool: Address) -> SourceResult<Option<Address>> {
        self.reward_contract(pool, "gaugeToBribe(address)").await
    }

    async fn gauge_state(&self, gauge: Address) -> SourceResult<Option<GaugeState>> {
        let alive_args = [AbiToken::Address(gauge)];
        let (alive, emissions, emissions_token, liquidity) = futures::join!(
            self.rpc
                .boolean(self.voter, "isAlive(address)", &alive_args),
            self.rpc.uint(gauge, "rewardRate()", &[]),
            self.rpc.address(gauge, "rewardToken()", &[]),
            self.rpc.uint(gauge, "totalSupply()", &[]),
        );
        Ok(Some(GaugeState {
            alive: alive?,
            emissions: emissions?,
            emissions_token: emissions_token?,
            liquidity: liquidity?,
            ..GaugeState::default()
        }))
    }

    async fn is_whitelisted_token(&self, token: Address) -> SourceResult<bool> {
        self.rpc
            .boolean(self.voter, "isWhitelistedToken(address)", &[AbiToken::Address(token)])
            .await
    }
}
