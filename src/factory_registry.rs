//! # Factory Registry
//!
//! Owner-gated list of approved pool factories. Each approved pool factory is
//! paired with exactly one gauge factory, one rewards factory and one init code
//! hash (used to recompute pool addresses off-chain, see `root_pool`).
//!
//! Lookups for factories that were never approved return the zero sentinel
//! instead of failing: the pool aggregator asks for every factory on each
//! positions fan-out and must not abort because one of them was unapproved in
//! the meantime.

use async_trait::async_trait;
use ethers::types::{Address, H256};
use indexmap::IndexMap;
use log::info;
use std::sync::RwLock;

use crate::error::{Result, SugarError};
use crate::sources::{FactoryRegistrySource, SourceResult};
use crate::types::FactoryRegistration;

pub struct FactoryRegistry {
    owner: Address,
    registrations: RwLock<IndexMap<Address, FactoryRegistration>>,
}

impl FactoryRegistry {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            registrations: RwLock::new(IndexMap::new()),
        }
    }

    /// Builds a registry from the parallel lists used at deployment time
    /// (`FACTORIES_<chain>`, `REWARDS_FACTORIES_<chain>`, ...).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when the lists differ in length or repeat a factory.
    pub fn from_lists(
        owner: Address,
        pool_factories: &[Address],
        rewards_factories: &[Address],
        gauge_factories: &[Address],
        init_hashes: &[H256],
    ) -> Result<Self> {
        let n = pool_factories.len();
        if rewards_factories.len() != n || gauge_factories.len() != n || init_hashes.len() != n {
            return Err(SugarError::InvalidArgument(format!(
                "factory lists differ in length: {} pool, {} rewards, {} gauge, {} init hashes",
                n,
                rewards_factories.len(),
                gauge_factories.len(),
                init_hashes.len()
            )));
        }

        let registry = Self::new(owner);
        for i in 0..n {
            registry.approve(
                owner,
                FactoryRegistration {
                    pool_factory: pool_factories[i],
                    gauge_factory: gauge_factories[i],
                    rewards_factory: rewards_factories[i],
                    init_code_hash: init_hashes[i],
                },
            )?;
        }
        Ok(registry)
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn approve(&self, caller: Address, registration: FactoryRegistration) -> Result<()> {
        self.ensure_owner(caller)?;
        if registration.pool_factory.is_zero() {
            return Err(SugarError::InvalidArgument(
                "pool factory cannot be the zero address".to_string(),
            ));
        }

        let mut regs = self.write();
        if regs.contains_key(&registration.pool_factory) {
            return Err(SugarError::InvalidArgument(format!(
                "pool factory {:?} already approved",
                registration.pool_factory
            )));
        }
        regs.insert(registration.pool_factory, registration);
        info!("Approved pool factory {:?}", registration.pool_factory);
        Ok(())
    }

    pub fn unapprove(&self, caller: Address, pool_factory: Address) -> Result<()> {
        self.ensure_owner(caller)?;
        let mut regs = self.write();
        if regs.shift_remove(&pool_factory).is_none() {
            return Err(SugarError::InvalidArgument(format!(
                "pool factory {:?} is not approved",
                pool_factory
            )));
        }
        info!("Unapproved pool factory {:?}", pool_factory);
        Ok(())
    }

    pub fn pool_factory_count(&self) -> usize {
        self.read().len()
    }

    pub fn pool_factories(&self) -> Vec<Address> {
        self.read().keys().copied().collect()
    }

    pub fn pool_factory_exists(&self, pool_factory: Address) -> bool {
        self.read().contains_key(&pool_factory)
    }

    pub fn registration(&self, pool_factory: Address) -> Option<FactoryRegistration> {
        self.read().get(&pool_factory).copied()
    }

    /// `(gauge_factory, pool_factory)`, with a zero gauge factory when
    /// `pool_factory` is unknown.
    pub fn factories_to_pool_factory(&self, pool_factory: Address) -> (Address, Address) {
        let gauge_factory = self
            .registration(pool_factory)
            .map(|r| r.gauge_factory)
            .unwrap_or_else(Address::zero);
        (gauge_factory, pool_factory)
    }

    pub fn init_hash_to_pool_factory(&self, pool_factory: Address) -> H256 {
        self.registration(pool_factory)
            .map(|r| r.init_code_hash)
            .unwrap_or_else(H256::zero)
    }

    pub fn rewards_factory(&self, pool_factory: Address) -> Address {
        self.registration(pool_factory)
            .map(|r| r.rewards_factory)
            .unwrap_or_else(Address::zero)
    }

    fn ensure_owner(&self, caller: Address) -> Result<()> {
        if caller != self.owner {
            return Err(SugarError::Unauthorized(format!("{:?}", caller)));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<Address, FactoryRegistration>> {
        self.registrations.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<Address, FactoryRegistration>> {
        self.registrations.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FactoryRegistrySource for FactoryRegistry {
    async fn pool_factories(&self) -> SourceResult<Vec<Address>> {
        Ok(FactoryRegistry::pool_factories(self))
    }

    async fn factories_to_pool_factory(&self, pool_factory: Address) -> SourceResult<(Address, Address)> {
        Ok(FactoryRegistry::factories_to_pool_factory(self, pool_factory))
    }

    async fn init_hash_to_pool_factory(&self, pool_factory: Address) -> SourceResult<H256> {
        Ok(FactoryRegistry::init_hash_to_pool_factory(self, pool_factory))
    }
}
