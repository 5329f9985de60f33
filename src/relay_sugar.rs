use ethers::types::Address;
use futures::stream::{self, StreamExt};
use log::warn;
use std::sync::Arc;

use crate::error::{Result, SugarError};
use crate::metrics::record_aggregator_call;
use crate::sources::{LockState, RelaySource, VotingEscrowSource};
use crate::sugar::{Context, Sources};
use crate::types::Relay;

/// Relay (autocompounder / autoconverter) listing across every configured
/// registry.
#[derive(Clone)]
pub struct RelaySugar {
    relays: Arc<dyn RelaySource>,
    escrow: Arc<dyn VotingEscrowSource>,
    concurrency: usize,
}

impl RelaySugar {
    pub fn new(sources: &Sources, context: &Context) -> Self {
        Self {
            relays: sources.relays.clone(),
            escrow: sources.escrow.clone(),
            concurrency: context.concurrency,
        }
    }

    /// Relays in registry declaration order, then in-registry order.
    ///
    /// The zero address disables filtering; any other `account` keeps the
    /// relays whose backing lock it owns.
    ///
    /// # Errors
    ///
    /// `UpstreamUnavailable` when a registry cannot be enumerated. A single
    /// unreadable relay is skipped instead.
    pub async fn all(&self, account: Address) -> Result<Vec<Relay>> {
        record_aggregator_call("relay.all");
        let registries = self
            .relays
            .registries()
            .await
            .map_err(|e| SugarError::upstream("relay_registry", e))?;

        let mut listed: Vec<(Address, Address)> = Vec::new();
        for registry in registries {
            let relays = self
                .relays
                .relays(registry)
                .await
                .map_err(|e| SugarError::upstream("relay_registry", e))?;
            listed.extend(relays.into_iter().map(|relay| (registry, relay)));
        }

        let relays: Vec<Option<Relay>> = stream::iter(listed)
            .map(|(registry, relay)| self.relay(registry, relay, account))
            .buffered(self.concurrency)
            .collect()
            .await;
        Ok(relays.into_iter().flatten().collect())
    }

    async fn relay(&self, registry: Address, address: Address, account: Address) -> Option<Relay> {
        let state = match self.relays.relay_state(address).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                warn!("Relay {:?} listed by {:?} has no state", address, registry);
                return None;
            }
            Err(e) => {
                warn!("Skipping relay {:?}: {}", address, e);
                return None;
            }
        };

        let lock: Option<LockState> = match self.escrow.lock_by_id(state.lock_id).await {
            Ok(lock) => lock,
            Err(e) => {
                warn!("Skipping relay {:?}: lock {} unreadable ({})", address, state.lock_id, e);
                return None;
            }
        };
        if !account.is_zero() && lock.as_ref().map(|l| l.owner) != Some(account) {
            return None;
        }

        Some(Relay {
            address,
            registry,
            lock_id: state.lock_id,
            token: state.token,
            balance: state.balance,
            voting_amount: lock.map(|l| l.voting_amount).unwrap_or_default(),
            name: state.name,
            manager: state.manager,
            inactive: state.inactive,
        })
    }
}
