// # Memory State Store
//
// In-memory implementation of StateStore.
//
// Nothing survives a restart: the first cycle after a restart treats every
// address as new and every cooldown as expired. Useful for tests and for
// embedding where persistence is not wanted.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::address::{Address, IpFamily};
use crate::traits::state_store::{CooldownMap, LastKnownIp, StateStore};

#[derive(Debug, Default)]
struct Inner {
    last_ip: LastKnownIp,
    cooldowns: CooldownMap,
}

/// In-memory state store implementation
///
/// Cloning shares the underlying state, so a test can keep a handle and
/// inspect what the orchestrator saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStateStore {
    /// Create a new empty memory state store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with last known addresses
    pub fn with_last_ip(last_ip: LastKnownIp) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                last_ip,
                cooldowns: CooldownMap::new(),
            })),
        }
    }

    /// Everything currently saved
    pub async fn last_ip(&self) -> LastKnownIp {
        self.inner.read().await.last_ip
    }

    /// The saved cooldown map
    pub async fn cooldowns(&self) -> CooldownMap {
        self.inner.read().await.cooldowns.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_last_ip(&self, family: IpFamily) -> Result<Option<Address>, Error> {
        Ok(self.inner.read().await.last_ip.get(family))
    }

    async fn save_last_ip(&self, address: &Address) -> Result<(), Error> {
        self.inner.write().await.last_ip.set(*address);
        Ok(())
    }

    async fn load_cooldowns(&self) -> Result<CooldownMap, Error> {
        Ok(self.inner.read().await.cooldowns.clone())
    }

    async fn save_cooldowns(&self, cooldowns: &CooldownMap) -> Result<(), Error> {
        self.inner.write().await.cooldowns = cooldowns.clone();
        Ok(())
    }
}
