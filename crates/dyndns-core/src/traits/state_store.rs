// # State Store Trait
//
// Defines the interface for persistent state management.
//
// ## Purpose
//
// The state store survives restarts and tracks:
// - The last address pushed for each family (`LastKnownIp`)
// - When each notification channel last sent a message (cooldowns)
//
// ## Implementations
//
// - File-based: one plain-text file per family plus `cooldowns.json`
// - Memory: for tests and embedding
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::{IpFamily, StateStore};
//
// let store = /* StateStore implementation */;
// let last = store.load_last_ip(IpFamily::V4).await?;
// store.save_last_ip(&address).await?;
// ```

use crate::address::{Address, IpFamily};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Channel key → time of the last send attempt
pub type CooldownMap = HashMap<String, DateTime<Utc>>;

/// The last addresses successfully handled by an update cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastKnownIp {
    pub v4: Option<Address>,
    pub v6: Option<Address>,
}

impl LastKnownIp {
    /// The address stored for `family`
    pub fn get(&self, family: IpFamily) -> Option<Address> {
        match family {
            IpFamily::V4 => self.v4,
            IpFamily::V6 => self.v6,
        }
    }

    /// Replace the address stored for the address's family
    pub fn set(&mut self, address: Address) {
        match address.family() {
            IpFamily::V4 => self.v4 = Some(address),
            IpFamily::V6 => self.v6 = Some(address),
        }
    }
}

/// Trait for state store implementations
///
/// A store only persists and returns data; deciding what to save and when
/// belongs to the orchestrator. Content that cannot be read back as valid
/// state is reported as absent (`Ok(None)` / empty map), never as an error,
/// so a corrupted file cannot stop the daemon.
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get the last known address for a family
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Address))`: A previously saved, still valid address
    /// - `Ok(None)`: Nothing saved, or the saved content is invalid
    /// - `Err(Error)`: Storage error
    async fn load_last_ip(&self, family: IpFamily) -> Result<Option<Address>, crate::Error>;

    /// Persist the last known address for the address's family
    async fn save_last_ip(&self, address: &Address) -> Result<(), crate::Error>;

    /// Load the persisted notification cooldown map
    async fn load_cooldowns(&self) -> Result<CooldownMap, crate::Error>;

    /// Replace the persisted notification cooldown map
    async fn save_cooldowns(&self, cooldowns: &CooldownMap) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::validate;

    #[test]
    fn test_last_known_ip_per_family() {
        let mut last = LastKnownIp::default();
        assert_eq!(last.get(IpFamily::V4), None);

        let v4 = validate("203.0.113.7", IpFamily::V4).unwrap();
        let v6 = validate("2001:db8::7", IpFamily::V6).unwrap();
        last.set(v4);
        last.set(v6);

        assert_eq!(last.get(IpFamily::V4), Some(v4));
        assert_eq!(last.get(IpFamily::V6), Some(v6));
    }
}
