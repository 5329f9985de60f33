//! # Sugar SDK
//!
//! A read-only aggregation engine over a DEX's on-chain state: pools, gauges,
//! positions, reward epochs, vote-escrow locks, relays and governance NFTs.
//!
//! ## Overview
//!
//! Every query is a pure function of the current state of a set of injected
//! sources plus explicit arguments. The engine produces paginated composite
//! records and tolerates partial data: a token whose metadata cannot be read,
//! a pool without a gauge or an empty epoch yields sentinel values and a
//! degradation annotation instead of a failed call.
//!
//! ## Architecture
//!
//! ### Sources
//! Async traits (`sources`) over each external ledger, implemented by the
//! ethers-backed `adapters` and by the in-memory `memory` ledger.
//!
//! ### Shared machinery
//! Limit/offset pagination with hard ceilings, fault-tolerant token
//! resolution, CREATE2 root-pool derivation and chain topology gating.
//!
//! ### Aggregators
//! `LpSugar`, `RewardsSugar`, `VeSugar`, `RelaySugar` and `GovNftSugar`,
//! bundled by the `Sugar` facade.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ethers::types::Address;
//! use sugar_sdk::{FactoryRegistry, MemoryLedger, Settings, Sources, Sugar};
//!
//! # async fn run() -> sugar_sdk::error::Result<()> {
//! let ledger = Arc::new(MemoryLedger::new());
//! let registry = Arc::new(FactoryRegistry::new(Address::zero()));
//! let sugar = Sugar::from_settings(Sources::from_memory(ledger, registry), &Settings::default());
//! let pools = sugar.lp.all(100, 0).await?;
//! # Ok(())
//! # }
//! ```

// Core Types
/// Record types returned by the aggregators
pub mod types;
/// Error taxonomy and degradation annotations
pub mod error;
/// Chain topology and capability flags
pub mod chain;

// Sources
/// Trait seam over the external ledgers
pub mod sources;
/// Ethers-backed source adapters
pub mod adapters;
/// In-memory ledger implementing every source
pub mod memory;
/// Owner-gated in-memory factory registry
pub mod factory_registry;

// Shared machinery
pub mod pagination;
pub mod token_resolver;
pub mod root_pool;

// Aggregators
pub mod lp_sugar;
pub mod rewards_sugar;
pub mod ve_sugar;
pub mod relay_sugar;
pub mod govnft_sugar;
pub mod sugar;

// Infrastructure
pub mod metrics;
pub mod settings;

// Re-exports for convenience
pub use chain::{Capability, ChainTopology};
pub use error::{SourceError, SugarError};
pub use factory_registry::FactoryRegistry;
pub use memory::MemoryLedger;
pub use settings::Settings;
pub use sugar::{Context, Sources, Sugar};
