//! Core traits for the dynamic DNS client
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`IpSource`]: Look up the current address
//! - [`DnsProvider`]: Push addresses to a provider API
//! - [`StateStore`]: Persist last known addresses and cooldowns
//! - [`Notifier`]: Deliver notification messages

pub mod dns_provider;
pub mod ip_source;
pub mod notifier;
pub mod state_store;

pub use dns_provider::{
    DnsProvider, DnsProviderFactory, FailureReason, UpdateOutcome, UpdateResult,
};
pub use ip_source::IpSource;
pub use notifier::Notifier;
pub use state_store::{CooldownMap, LastKnownIp, StateStore};
