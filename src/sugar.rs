//! # Sugar facade
//!
//! [`Sugar`] wires one [`Sources`] set and one [`Context`] into every
//! aggregator. Aggregators hold `Arc`s only, so a `Sugar` is cheap to clone and
//! safe to share across tasks.

use std::sync::Arc;

use crate::chain::ChainTopology;
use crate::govnft_sugar::GovNftSugar;
use crate::lp_sugar::LpSugar;
use crate::memory::MemoryLedger;
use crate::pagination::Limits;
use crate::relay_sugar::RelaySugar;
use crate::rewards_sugar::RewardsSugar;
use crate::settings::Settings;
use crate::sources::{
    AlmSource, Clock, FactoryRegistrySource, GovNftSource, PoolRegistry, PositionSource,
    RelaySource, RewardLedger, SystemClock, TokenSource, VoterSource, VotingEscrowSource,
};
use crate::token_resolver::TokenResolver;
use crate::ve_sugar::VeSugar;

/// The external collaborators every aggregator reads from.
#[derive(Clone)]
pub struct Sources {
    pub pools: Arc<dyn PoolRegistry>,
    pub voter: Arc<dyn VoterSource>,
    pub tokens: Arc<dyn TokenSource>,
    pub positions: Arc<dyn PositionSource>,
    pub alm: Arc<dyn AlmSource>,
    pub rewards: Arc<dyn RewardLedger>,
    pub escrow: Arc<dyn VotingEscrowSource>,
    pub relays: Arc<dyn RelaySource>,
    pub registry: Arc<dyn FactoryRegistrySource>,
    pub govnft: Arc<dyn GovNftSource>,
}

impl Sources {
    /// Every source backed by the same in-memory ledger, plus a separate
    /// factory registry.
    pub fn from_memory(ledger: Arc<MemoryLedger>, registry: Arc<dyn FactoryRegistrySource>) -> Self {
        Self {
            pools: ledger.clone(),
            voter: ledger.clone(),
            tokens: ledger.clone(),
            positions: ledger.clone(),
            alm: ledger.clone(),
            rewards: ledger.clone(),
            escrow: ledger.clone(),
            relays: ledger.clone(),
            govnft: ledger,
            registry,
        }
    }
}

/// Per-instance policy shared by the aggregators.
#[derive(Clone)]
pub struct Context {
    pub topology: ChainTopology,
    pub limits: Limits,
    pub concurrency: usize,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            topology: settings.topology(),
            limits: Limits::from(&settings.limits),
            concurrency: settings.performance.max_concurrency.max(1),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn resolver(&self, sources: &Sources) -> TokenResolver {
        TokenResolver::new(sources.tokens.clone(), sources.voter.clone(), self.concurrency)
    }
}

#[derive(Clone)]
pub struct Sugar {
    pub lp: LpSugar,
    pub rewards: RewardsSugar,
    pub ve: VeSugar,
    pub relay: RelaySugar,
    pub govnft: GovNftSugar,
    topology: ChainTopology,
}

impl Sugar {
    pub fn new(sources: Sources, context: Context) -> Self {
        Self {
            lp: LpSugar::new(&sources, &context),
            rewards: RewardsSugar::new(&sources, &context),
            ve: VeSugar::new(&sources, &context),
            relay: RelaySugar::new(&sources, &context),
            govnft: GovNftSugar::new(&sources, &context),
            topology: context.topology,
        }
    }

    pub fn from_settings(sources: Sources, settings: &Settings) -> Self {
        Self::new(sources, Context::from_settings(settings))
    }

    /// Capability flags of the chain this instance serves.
    pub fn topology(&self) -> ChainTopology {
        self.topology
    }
}
