//! # Epoch and rewards aggregator
//!
//! Epochs are iterated newest-first from the epoch containing `clock.now()`.
//! Reward entries are fetched once per page over the window spanned by the
//! page and bucketed by epoch start, so a page costs two reward lookups plus
//! one votes/emissions pair per epoch.

use ethers::types::{Address, U256};
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::{Capability, ChainTopology};
use crate::error::{Degradation, Result, SugarError};
use crate::metrics::record_aggregator_call;
use crate::pagination::{check_limit, paginate, Limits};
use crate::sources::{Clock, EpochWindow, PoolRegistry, RawReward, RewardLedger, VoterSource};
use crate::sugar::{Context, Sources};
use crate::types::{epoch_start, or_zero, Epoch, RewardEntry, RewardKind, RootAddresses, WEEK};

#[derive(Clone)]
pub struct RewardsSugar {
    pools: Arc<dyn PoolRegistry>,
    voter: Arc<dyn VoterSource>,
    rewards: Arc<dyn RewardLedger>,
    clock: Arc<dyn Clock>,
    topology: ChainTopology,
    limits: Limits,
    concurrency: usize,
}

impl RewardsSugar {
    pub fn new(sources: &Sources, context: &Context) -> Self {
        Self {
            pools: sources.pools.clone(),
            voter: sources.voter.clone(),
            rewards: sources.rewards.clone(),
            clock: context.clock.clone(),
            topology: context.topology,
            limits: context.limits,
            concurrency: context.concurrency,
        }
    }

    /// Epochs of `lp`'s gauge, newest first. Empty when the pool has no gauge
    /// or the gauge never took part in an epoch.
    pub async fn epochs_by_address(&self, limit: u64, offset: u64, lp: Address) -> Result<Vec<Epoch>> {
        record_aggregator_call("rewards.epochs_by_address");
        check_limit(limit, self.limits.max_epochs)?;

        let gauge = self
            .voter
            .gauge_for_pool(lp)
            .await
            .map_err(|e| SugarError::upstream("voter", e))?;
        if gauge.is_none() {
            return Ok(Vec::new());
        }
        let first = self
            .rewards
            .first_epoch(lp)
            .await
            .map_err(|e| SugarError::upstream("reward_ledger", e))?;

        let current = epoch_start(self.clock.now());
        let total = epoch_count(first, current);
        let range = paginate(total, limit, offset, self.limits.max_epochs)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }

        let starts: Vec<u64> = range.map(|i| current - i * WEEK).collect();
        let window = EpochWindow {
            start: starts[starts.len() - 1],
            end: starts[0] + WEEK,
        };

        let mut shared_degraded = Vec::new();
        let (mut bribes, mut fees) = self.rewards_in(lp, window, &mut shared_degraded).await;

        Ok(stream::iter(starts)
            .map(|ts| {
                let bribes = bribes.remove(&ts).unwrap_or_default();
                let fees = fees.remove(&ts).unwrap_or_default();
                self.epoch(lp, ts, bribes, fees, shared_degraded.clone())
            })
            .buffered(self.concurrency)
            .collect()
            .await)
    }

    /// The current epoch of every pool in the page whose gauge is alive and
    /// has started. An empty result is valid.
    pub async fn epochs_latest(&self, limit: u64, offset: u64) -> Result<Vec<Epoch>> {
        record_aggregator_call("rewards.epochs_latest");
        self.topology.require(Capability::EpochsLatest)?;
        check_limit(limit, self.limits.max_lps)?;

        let total = self
            .pools
            .count()
            .await
            .map_err(|e| SugarError::upstream("pool_registry", e))?;
        let range = paginate(total, limit, offset, self.limits.max_lps)?;
        let current = epoch_start(self.clock.now());

        let lps: Vec<Address> = self
            .pools
            .get_range(range)
            .await
            .map_err(|e| SugarError::upstream("pool_registry", e))?
            .into_iter()
            .map(|state| state.address)
            .collect();

        let epochs: Vec<Option<Epoch>> = stream::iter(lps)
            .map(|lp| self.latest_epoch(lp, current))
            .buffered(self.concurrency)
            .collect()
            .await;
        Ok(epochs.into_iter().flatten().collect())
    }

    /// Gauge, fee and bribe contracts for `lp`, zero where missing.
    pub async fn for_root(&self, lp: Address) -> Result<RootAddresses> {
        record_aggregator_call("rewards.for_root");
        self.topology.require(Capability::ForRoot)?;

        let (gauge, fee, bribe) = futures::join!(
            self.voter.gauge_for_pool(lp),
            self.voter.fee_contract_for_pool(lp),
            self.voter.bribe_contract_for_pool(lp),
        );
        let up = |e| SugarError::upstream("voter", e);
        Ok(RootAddresses {
            gauge: or_zero(gauge.map_err(up)?),
            fee: or_zero(fee.map_err(up)?),
            bribe: or_zero(bribe.map_err(up)?),
        })
    }

    async fn latest_epoch(&self, lp: Address, current: u64) -> Option<Epoch> {
        let gauge = match self.voter.gauge_for_pool(lp).await {
            Ok(Some(gauge)) => gauge,
            Ok(None) => return None,
            Err(e) => {
                warn!("Skipping {:?} in latest epochs: gauge lookup failed ({})", lp, e);
                return None;
            }
        };
        match self.voter.gauge_state(gauge).await {
            Ok(Some(state)) if state.alive => {}
            Ok(_) => return None,
            Err(e) => {
                warn!("Skipping {:?} in latest epochs: gauge {:?} unreadable ({})", lp, gauge, e);
                return None;
            }
        }
        match self.rewards.first_epoch(lp).await {
            Ok(Some(first)) if epoch_start(first) <= current => {}
            Ok(_) => return None,
            Err(e) => {
                warn!("Skipping {:?} in latest epochs: first epoch unavailable ({})", lp, e);
                return None;
            }
        }

        let window = EpochWindow {
            start: current,
            end: current + WEEK,
        };
        let mut degraded = Vec::new();
        let (mut bribes, mut fees) = self.rewards_in(lp, window, &mut degraded).await;
        let bribes = bribes.remove(&current).unwrap_or_default();
        let fees = fees.remove(&current).unwrap_or_default();
        Some(self.epoch(lp, current, bribes, fees, degraded).await)
    }

    async fn rewards_in(
        &self,
        lp: Address,
        window: EpochWindow,
        degraded: &mut Vec<Degradation>,
    ) -> (HashMap<u64, Vec<RewardEntry>>, HashMap<u64, Vec<RewardEntry>>) {
        let (bribes, fees) = futures::join!(
            self.rewards.bribe_entries(lp, window),
            self.rewards.fee_entries(lp, window)
        );
        let bribes = match bribes {
            Ok(entries) => bucket_rewards(RewardKind::Bribe, lp, entries),
            Err(e) => {
                degraded.push(Degradation::new("bribes", e));
                HashMap::new()
            }
        };
        let fees = match fees {
            Ok(entries) => bucket_rewards(RewardKind::Fee, lp, entries),
            Err(e) => {
                degraded.push(Degradation::new("fees", e));
                HashMap::new()
            }
        };
        (bribes, fees)
    }

    async fn epoch(
        &self,
        lp: Address,
        ts: u64,
        bribes: Vec<RewardEntry>,
        fees: Vec<RewardEntry>,
        mut degraded: Vec<Degradation>,
    ) -> Epoch {
        let (votes, emissions) = futures::join!(self.rewards.votes(lp, ts), self.rewards.emissions(lp, ts));
        let votes = votes.unwrap_or_else(|e| {
            degraded.push(Degradation::new("votes", e));
            U256::zero()
        });
        let emissions = emissions.unwrap_or_else(|e| {
            degraded.push(Degradation::new("emissions", e));
            U256::zero()
        });
        if !degraded.is_empty() {
            debug!("Epoch {} of {:?} assembled with fallbacks: {:?}", ts, lp, degraded);
        }
        Epoch {
            ts,
            lp,
            votes,
            emissions,
            bribes,
            fees,
            degraded,
        }
    }
}

/// Number of epochs from `first` through `current`, both epoch starts.
pub fn epoch_count(first: Option<u64>, current: u64) -> u64 {
    match first.map(epoch_start) {
        Some(first) if first <= current => (current - first) / WEEK + 1,
        _ => 0,
    }
}

/// Groups entries by the start of the epoch containing their timestamp,
/// preserving source order inside each bucket. Zero amounts are dropped.
pub fn bucket_rewards(kind: RewardKind, lp: Address, entries: Vec<RawReward>) -> HashMap<u64, Vec<RewardEntry>> {
    let mut buckets: HashMap<u64, Vec<RewardEntry>> = HashMap::new();
    for raw in entries.into_iter().filter(|r| !r.amount.is_zero()) {
        let epoch = epoch_start(raw.timestamp);
        buckets.entry(epoch).or_default().push(RewardEntry {
            kind,
            lp,
            token: raw.token,
            amount: raw.amount,
            epoch,
            source: raw.source,
        });
    }
    buckets
}
