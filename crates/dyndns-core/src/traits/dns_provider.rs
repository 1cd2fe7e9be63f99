// # DNS Provider Trait
//
// Defines the interface for pushing addresses to a DNS provider API.
//
// ## Implementations
//
// - Cloudflare: `dyndns-provider-cloudflare` crate
// - DynDNS2 (generic `/nic/update` servers): `dyndns-provider-dyndns2` crate
// - IPv64.net: `dyndns-provider-ipv64` crate
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::{DnsProvider, UpdateOutcome};
//
// let provider = /* DnsProvider implementation */;
// match provider.update(Some("203.0.113.7".parse()?), None).await {
//     UpdateOutcome::Updated { .. } => println!("record changed"),
//     UpdateOutcome::Unchanged => println!("already current"),
//     UpdateOutcome::Failed(reason) => println!("failed: {reason}"),
// }
// ```

use crate::error::Error;
use async_trait::async_trait;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};

/// Successful result of a provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// At least one record now holds a new address
    Updated {
        /// The IPv4 address that was written, if any
        ipv4: Option<Ipv4Addr>,
        /// The IPv6 address that was written, if any
        ipv6: Option<Ipv6Addr>,
    },
    /// Every record already had the requested address (no-op)
    Unchanged,
}

/// Why a provider call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The provider asked us to slow down
    RateLimited,
    /// Credentials were refused
    Authentication,
    /// Network trouble or a server-side error; retrying later may work
    Transient,
    /// The provider is misconfigured
    Config,
    /// The provider understood the request and refused it
    Rejected,
}

impl From<&Error> for FailureReason {
    fn from(err: &Error) -> Self {
        match err {
            Error::RateLimited(_) => FailureReason::RateLimited,
            Error::Authentication(_) => FailureReason::Authentication,
            Error::Config(_) | Error::UnknownProviderType { .. } | Error::InvalidAddress { .. } => {
                FailureReason::Config
            }
            Error::Http(_)
            | Error::Timeout(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::NoAddressAvailable(_)
            | Error::IpSource(_) => FailureReason::Transient,
            Error::NotFound(_)
            | Error::Provider { .. }
            | Error::StateStore(_)
            | Error::Notification(_)
            | Error::Other(_) => FailureReason::Rejected,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::RateLimited => "rate limited",
            FailureReason::Authentication => "authentication failed",
            FailureReason::Transient => "transient error",
            FailureReason::Config => "configuration error",
            FailureReason::Rejected => "rejected by provider",
        };
        f.write_str(s)
    }
}

/// Outcome of one [`DnsProvider::update`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The provider changed at least one record
    Updated {
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    },
    /// Nothing needed changing
    Unchanged,
    /// The call failed; the orchestrator decides what happens next
    Failed(FailureReason),
}

impl UpdateOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, UpdateOutcome::Failed(_))
    }
}

impl From<UpdateResult> for UpdateOutcome {
    fn from(result: UpdateResult) -> Self {
        match result {
            UpdateResult::Updated { ipv4, ipv6 } => UpdateOutcome::Updated { ipv4, ipv6 },
            UpdateResult::Unchanged => UpdateOutcome::Unchanged,
        }
    }
}

/// Trait for DNS provider implementations
///
/// A provider performs one update per call: it holds no retry loop,
/// spawns no tasks and keeps no state between calls. Retry, rate-limit
/// holds and notifications belong to the orchestrator.
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Check that every required credential and target field is present
    ///
    /// Called by the registry right after construction, so a provider that
    /// fails here never takes part in an update cycle.
    fn validate_config(&self) -> Result<(), Error>;

    /// Push the given addresses to the provider
    ///
    /// `None` for a family means "leave that record alone". Must be
    /// idempotent: repeating a call with the same addresses yields
    /// `UpdateResult::Unchanged` (or an equivalent no-op `Updated`
    /// for protocols that cannot tell).
    async fn update_record(
        &self,
        ipv4: Option<Ipv4Addr>,
        ipv6: Option<Ipv6Addr>,
    ) -> Result<UpdateResult, Error>;

    /// Push the given addresses and classify any failure
    ///
    /// Never returns an error; failures become [`UpdateOutcome::Failed`].
    async fn update(&self, ipv4: Option<Ipv4Addr>, ipv6: Option<Ipv6Addr>) -> UpdateOutcome {
        match self.update_record(ipv4, ipv6).await {
            Ok(result) => {
                debug!("[{}] update result: {:?}", self.name(), result);
                result.into()
            }
            Err(e) => {
                let reason = FailureReason::from(&e);
                warn!("[{}] update failed ({}): {}", self.name(), reason, e);
                UpdateOutcome::Failed(reason)
            }
        }
    }

    /// The configured instance name (e.g. "home-cf")
    fn name(&self) -> &str;

    /// A static string identifying the protocol (e.g. "cloudflare", "dyndns2")
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from its configuration entry
    fn create(
        &self,
        spec: &crate::config::ProviderSpec,
    ) -> Result<Box<dyn DnsProvider>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        result: fn() -> Result<UpdateResult, Error>,
    }

    #[async_trait]
    impl DnsProvider for Scripted {
        fn validate_config(&self) -> Result<(), Error> {
            Ok(())
        }

        async fn update_record(
            &self,
            _ipv4: Option<Ipv4Addr>,
            _ipv6: Option<Ipv6Addr>,
        ) -> Result<UpdateResult, Error> {
            (self.result)()
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_update_maps_results() {
        let ok = Scripted {
            result: || {
                Ok(UpdateResult::Updated {
                    ipv4: Some(Ipv4Addr::new(1, 2, 3, 4)),
                    ipv6: None,
                })
            },
        };
        assert_eq!(
            ok.update(Some(Ipv4Addr::new(1, 2, 3, 4)), None).await,
            UpdateOutcome::Updated {
                ipv4: Some(Ipv4Addr::new(1, 2, 3, 4)),
                ipv6: None
            }
        );

        let same = Scripted {
            result: || Ok(UpdateResult::Unchanged),
        };
        assert_eq!(same.update(None, None).await, UpdateOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_update_classifies_errors() {
        let limited = Scripted {
            result: || Err(Error::rate_limited("overcommited")),
        };
        assert_eq!(
            limited.update(None, None).await,
            UpdateOutcome::Failed(FailureReason::RateLimited)
        );

        let refused = Scripted {
            result: || Err(Error::auth("badauth")),
        };
        assert_eq!(
            refused.update(None, None).await,
            UpdateOutcome::Failed(FailureReason::Authentication)
        );

        let flaky = Scripted {
            result: || Err(Error::http("503 Service Unavailable")),
        };
        assert_eq!(
            flaky.update(None, None).await,
            UpdateOutcome::Failed(FailureReason::Transient)
        );
    }

    #[test]
    fn test_failure_reason_from_error() {
        assert_eq!(FailureReason::from(&Error::config("x")), FailureReason::Config);
        assert_eq!(
            FailureReason::from(&Error::provider("dyndns2", "nohost")),
            FailureReason::Rejected
        );
        assert_eq!(FailureReason::from(&Error::timeout("x")), FailureReason::Transient);
    }
}
