//! Chain topology and capability gating.
//!
//! Root chains host the canonical voting escrow and the cross-chain reward
//! ledger. Leaf chains only host pools, so a handful of operations make no sense
//! there and must be reported as unsupported instead of returning an empty
//! result.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SugarError};

/// Chains hosting the canonical voting escrow (Optimism, Base).
pub const DEFAULT_ROOT_CHAIN_IDS: [u64; 2] = [10, 8453];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainTopology {
    Root,
    Leaf,
}

/// Operations that are only available on some topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ForRoot,
    EpochsLatest,
    UnstakedConcentratedPositions,
    AlmPositions,
    VoteEscrow,
}

impl ChainTopology {
    pub fn for_chain(chain_id: u64, root_chain_ids: &[u64]) -> Self {
        if root_chain_ids.contains(&chain_id) {
            ChainTopology::Root
        } else {
            ChainTopology::Leaf
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ChainTopology::Root)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::ForRoot
            | Capability::EpochsLatest
            | Capability::UnstakedConcentratedPositions
            | Capability::AlmPositions
            | Capability::VoteEscrow => self.is_root(),
        }
    }

    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(SugarError::Unsupported {
                capability,
                topology: *self,
            })
        }
    }
}
