// # IP Source Trait
//
// Defines the interface for looking up the host's current address.
//
// ## Implementations
//
// - HTTP lookup services: `dyndns-ip-http` crate
// - Local network interface: `dyndns-ip-iface` crate
//
// ## Usage
//
// ```rust,ignore
// use dyndns_core::{IpFamily, IpSource};
//
// let source = /* IpSource implementation */;
// let raw = source.fetch(IpFamily::V4).await?;
// let address = dyndns_core::address::validate(raw.trim(), IpFamily::V4)?;
// ```

use crate::address::IpFamily;
use async_trait::async_trait;

/// Trait for IP source implementations
///
/// A source performs exactly one lookup per call and returns the raw
/// literal it found. It does not trim, validate, time out or retry:
/// the [`IpResolver`](crate::resolver::IpResolver) owns all of that.
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Look up the current address of the given family
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The raw address literal (possibly with whitespace)
    /// - `Err(Error)`: If the lookup failed
    async fn fetch(&self, family: IpFamily) -> Result<String, crate::Error>;

    /// Human-readable description for logs (URL, interface name, ...)
    fn describe(&self) -> String;
}
