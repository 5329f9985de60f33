//! Vote-escrow aggregator.
//!
//! Locks are NFTs with sequential ids starting at 1. Burned ids stay counted
//! by the escrow, so `all` scans past them to fill a page.

use ethers::types::{Address, U256};
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, warn};
use std::sync::Arc;

use crate::chain::{Capability, ChainTopology};
use crate::error::{Degradation, Result, SugarError};
use crate::metrics::record_aggregator_call;
use crate::pagination::{check_limit, Limits};
use crate::sources::{Clock, EscrowType, LockState, RewardLedger, VoterSource, VotingEscrowSource};
use crate::sugar::{Context, Sources};
use crate::token_resolver::TokenResolver;
use crate::types::{epoch_start, LockVote, RewardEntry, RewardKind, VeLock};

#[derive(Clone)]
pub struct VeSugar {
    escrow: Arc<dyn VotingEscrowSource>,
    voter: Arc<dyn VoterSource>,
    rewards: Arc<dyn RewardLedger>,
    resolver: TokenResolver,
    clock: Arc<dyn Clock>,
    topology: ChainTopology,
    limits: Limits,
    concurrency: usize,
}

/// Locked token and its decimals, read once per call.
struct EscrowToken {
    address: Address,
    decimals: u8,
    degraded: Option<Degradation>,
}

impl VeSugar {
    pub fn new(sources: &Sources, context: &Context) -> Self {
        Self {
            escrow: sources.escrow.clone(),
            voter: sources.voter.clone(),
            rewards: sources.rewards.clone(),
            resolver: context.resolver(sources),
            clock: context.clock.clone(),
            topology: context.topology,
            limits: context.limits,
            concurrency: context.concurrency,
        }
    }

    pub async fn by_id(&self, id: u64) -> Result<VeLock> {
        record_aggregator_call("ve.by_id");
        self.topology.require(Capability::VoteEscrow)?;
        let lock = self.lock(id).await?;
        let token = self.escrow_token().await?;
        Ok(self.assemble(lock, &token).await)
    }

    /// Every lock owned by `account`, in escrow order.
    pub async fn by_account(&self, account: Address) -> Result<Vec<VeLock>> {
        record_aggregator_call("ve.by_account");
        self.topology.require(Capability::VoteEscrow)?;
        let ids = self
            .escrow
            .locks_by_account(account)
            .await
            .map_err(|e| SugarError::upstream("voting_escrow", e))?;
        self.locks_for_ids(ids).await
    }

    /// Up to `limit` existing locks, scanning ids upwards from `offset`.
    ///
    /// Ids without a lock (id 0, burned ids) are skipped, so the page keeps
    /// filling until `limit` locks are found, `lock_count` is passed or
    /// `max_locks` ids have been looked up.
    pub async fn all(&self, limit: u64, offset: u64) -> Result<Vec<VeLock>> {
        record_aggregator_call("ve.all");
        self.topology.require(Capability::VoteEscrow)?;
        check_limit(limit, self.limits.max_locks)?;

        let count = self
            .escrow
            .lock_count()
            .await
            .map_err(|e| SugarError::upstream("voting_escrow", e))?;
        let ids = scan_ids(offset, count, self.limits.max_locks);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.escrow_token().await?;

        let locks: Vec<LockState> = stream::iter(ids)
            .map(|id| self.escrow.lock_by_id(id))
            .buffered(self.concurrency)
            .try_filter_map(|lock| async move { Ok(lock) })
            .take(limit as usize)
            .try_collect()
            .await
            .map_err(|e| SugarError::upstream("voting_escrow", e))?;

        Ok(stream::iter(locks)
            .map(|lock| self.assemble(lock, &token))
            .buffered(self.concurrency)
            .collect()
            .await)
    }

    /// Unclaimed fee and bribe rewards on every pool the lock voted for,
    /// followed by the claimable rebase. Zero amounts are omitted.
    pub async fn rewards(&self, id: u64) -> Result<Vec<RewardEntry>> {
        record_aggregator_call("ve.rewards");
        self.topology.require(Capability::VoteEscrow)?;
        self.lock(id).await?;

        let votes = self
            .escrow
            .votes_of(id)
            .await
            .map_err(|e| SugarError::upstream("voting_escrow", e))?;
        let epoch = epoch_start(self.clock.now());

        let per_pool: Vec<Vec<RewardEntry>> = stream::iter(votes)
            .map(|(lp, _)| self.pool_rewards(lp, id, epoch))
            .buffered(self.concurrency)
            .collect()
            .await;
        let mut entries: Vec<RewardEntry> = per_pool.into_iter().flatten().collect();

        match self.escrow.claimable_rebase(id).await {
            Ok(amount) if !amount.is_zero() => match self.escrow.token().await {
                Ok(token) => entries.push(RewardEntry {
                    kind: RewardKind::Rebase,
                    lp: Address::zero(),
                    token,
                    amount,
                    epoch,
                    source: Address::zero(),
                }),
                Err(e) => warn!("Skipping rebase of lock {}: escrow token unavailable ({})", id, e),
            },
            Ok(_) => {}
            Err(e) => warn!("Rebase of lock {} unavailable: {}", id, e),
        }
        Ok(entries)
    }

    async fn pool_rewards(&self, lp: Address, id: u64, epoch: u64) -> Vec<RewardEntry> {
        let (fee, bribe) = futures::join!(
            self.voter.fee_contract_for_pool(lp),
            self.voter.bribe_contract_for_pool(lp)
        );
        let mut entries = Vec::new();
        for (kind, contract) in [(RewardKind::Fee, fee), (RewardKind::Bribe, bribe)] {
            let contract = match contract {
                Ok(Some(contract)) => contract,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping {:?} rewards of {:?} for lock {}: {}", kind, lp, id, e);
                    continue;
                }
            };
            match self.rewards.earned(contract, id).await {
                Ok(earned) => entries.extend(
                    earned
                        .into_iter()
                        .filter(|(_, amount)| !amount.is_zero())
                        .map(|(token, amount)| RewardEntry {
                            kind,
                            lp,
                            token,
                            amount,
                            epoch,
                            source: contract,
                        }),
                ),
                Err(e) => warn!("Earned on {:?} for lock {} unavailable: {}", contract, id, e),
            }
        }
        entries
    }

    async fn lock(&self, id: u64) -> Result<LockState> {
        self.escrow
            .lock_by_id(id)
            .await
            .map_err(|e| SugarError::upstream("voting_escrow", e))?
            .ok_or_else(|| SugarError::not_found("lock", id))
    }

    async fn locks_for_ids(&self, ids: Vec<u64>) -> Result<Vec<VeLock>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let token = self.escrow_token().await?;

        let locks: Vec<Option<LockState>> = stream::iter(ids)
            .map(|id| self.escrow.lock_by_id(id))
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| SugarError::upstream("voting_escrow", e))?;

        Ok(stream::iter(locks.into_iter().flatten())
            .map(|lock| self.assemble(lock, &token))
            .buffered(self.concurrency)
            .collect()
            .await)
    }

    async fn escrow_token(&self) -> Result<EscrowToken> {
        let address = self
            .escrow
            .token()
            .await
            .map_err(|e| SugarError::upstream("voting_escrow", e))?;
        let token = self.resolver.resolve(address).await;
        let degraded = token
            .status
            .is_degraded()
            .then(|| Degradation::new("decimals", "escrow token metadata unavailable"));
        Ok(EscrowToken {
            address,
            decimals: token.decimals,
            degraded,
        })
    }

    async fn assemble(&self, lock: LockState, token: &EscrowToken) -> VeLock {
        let mut degraded: Vec<Degradation> = token.degraded.iter().cloned().collect();

        let (votes, rebase) = futures::join!(
            self.escrow.votes_of(lock.id),
            self.escrow.claimable_rebase(lock.id)
        );
        let votes = match votes {
            Ok(votes) => votes
                .into_iter()
                .map(|(lp, weight)| LockVote { lp, weight })
                .collect(),
            Err(e) => {
                degraded.push(Degradation::new("votes", e));
                Vec::new()
            }
        };
        let rebase_amount = rebase.unwrap_or_else(|e| {
            degraded.push(Degradation::new("rebase_amount", e));
            U256::zero()
        });

        // Managed locks and locks deposited into one carry no governance weight.
        let voting_power = match lock.escrow_type {
            EscrowType::Normal => lock.voting_amount,
            EscrowType::Locked | EscrowType::Managed => U256::zero(),
        };

        if !degraded.is_empty() {
            debug!("Lock {} assembled with fallbacks: {:?}", lock.id, degraded);
        }

        VeLock {
            id: lock.id,
            account: lock.owner,
            decimals: token.decimals,
            amount: lock.amount,
            voting_amount: lock.voting_amount,
            voting_power,
            rebase_amount,
            expires_at: lock.expires_at,
            voted_at: lock.voted_at,
            votes,
            token: token.address,
            permanent: lock.permanent,
            delegate_id: lock.delegate_id.unwrap_or(0),
            managed_id: lock.managed_id.unwrap_or(0),
            managed: lock.escrow_type == EscrowType::Managed,
            degraded,
        }
    }
}

/// Lock ids `all` may look up: `offset..=lock_count`, at most `max_lookups` of them.
fn scan_ids(offset: u64, lock_count: u64, max_lookups: u64) -> Vec<u64> {
    if max_lookups == 0 || offset > lock_count {
        return Vec::new();
    }
    let last = lock_count.min(offset.saturating_add(max_lookups - 1));
    (offset..=last).collect()
}
