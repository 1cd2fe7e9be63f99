//! Public address resolution
//!
//! An [`IpResolver`] owns the ordered service list for one address family.
//! Probes run with bounded parallelism but are consumed strictly in list
//! order, so the first-listed service that returns a valid literal always
//! wins, no matter which probe finished first. Once a result is accepted,
//! the probes still in flight are dropped.
//!
//! When every service fails, the optional interface fallback is consulted.
//! Exhausting all sources is reported as [`Error::NoAddressAvailable`],
//! which the orchestrator feeds into the backoff controller.

use crate::address::{self, Address, IpFamily};
use crate::error::{Error, Result};
use crate::traits::IpSource;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-service timeout
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of probes in flight at once
pub const DEFAULT_PROBE_PARALLELISM: usize = 2;

/// Resolves the current address of one family
#[derive(Clone)]
pub struct IpResolver {
    family: IpFamily,
    services: Vec<Arc<dyn IpSource>>,
    fallback: Option<Arc<dyn IpSource>>,
    timeout: Duration,
    parallelism: usize,
}

impl std::fmt::Debug for IpResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpResolver")
            .field("family", &self.family)
            .field(
                "services",
                &self.services.iter().map(|s| s.describe()).collect::<Vec<_>>(),
            )
            .field("fallback", &self.fallback.as_ref().map(|s| s.describe()))
            .field("timeout", &self.timeout)
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

impl IpResolver {
    /// Create a resolver over an ordered service list
    pub fn new(family: IpFamily, services: Vec<Arc<dyn IpSource>>) -> Self {
        Self {
            family,
            services,
            fallback: None,
            timeout: DEFAULT_SERVICE_TIMEOUT,
            parallelism: DEFAULT_PROBE_PARALLELISM,
        }
    }

    /// Consult `source` when every service has failed
    pub fn with_fallback(mut self, source: Arc<dyn IpSource>) -> Self {
        self.fallback = Some(source);
        self
    }

    /// Per-probe timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Maximum probes in flight (at least 1)
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Acquire the current address
    pub async fn resolve(&self) -> Result<Address> {
        let family = self.family;
        let timeout = self.timeout;

        let pending: Vec<_> = self
            .services
            .iter()
            .cloned()
            .map(|source| async move {
                let result = probe(source.as_ref(), family, timeout).await;
                (source, result)
            })
            .collect();
        let mut probes = stream::iter(pending).buffered(self.parallelism);

        while let Some((source, result)) = probes.next().await {
            match result {
                Ok(addr) => {
                    info!("Resolved {} address {} via {}", family, addr, source.describe());
                    return Ok(addr);
                }
                Err(e) => warn!("{} lookup via {} failed: {}", family, source.describe(), e),
            }
        }
        drop(probes);

        if let Some(fallback) = &self.fallback {
            debug!("All {} services failed, trying {}", family, fallback.describe());
            match probe(fallback.as_ref(), family, timeout).await {
                Ok(addr) => {
                    info!(
                        "Resolved {} address {} via fallback {}",
                        family,
                        addr,
                        fallback.describe()
                    );
                    return Ok(addr);
                }
                Err(e) => warn!("{} fallback {} failed: {}", family, fallback.describe(), e),
            }
        }

        Err(Error::NoAddressAvailable(family))
    }
}

/// One bounded-time lookup, trimmed and validated
async fn probe(source: &dyn IpSource, family: IpFamily, timeout: Duration) -> Result<Address> {
    let raw = tokio::time::timeout(timeout, source.fetch(family))
        .await
        .map_err(|_| Error::timeout(format!("{} after {:?}", source.describe(), timeout)))??;
    address::validate(raw.trim(), family)
}

/// The resolvers for every enabled family
#[derive(Debug, Clone, Default)]
pub struct Resolvers {
    pub v4: Option<IpResolver>,
    pub v6: Option<IpResolver>,
}

impl Resolvers {
    pub fn get(&self, family: IpFamily) -> Option<&IpResolver> {
        match family {
            IpFamily::V4 => self.v4.as_ref(),
            IpFamily::V6 => self.v6.as_ref(),
        }
    }

    /// Families with a configured resolver, IPv4 first
    pub fn families(&self) -> Vec<IpFamily> {
        IpFamily::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_some())
            .collect()
    }
}
