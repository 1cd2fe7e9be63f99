// # Interface IP Source
//
// Reads the address assigned to a local network interface.
//
// This is the resolver's last resort: it is only consulted after every
// HTTP service failed for a family. It is also the only way to learn the
// address when the host sits directly on a public prefix with no outbound
// HTTP, which is common for IPv6.
//
// ## Selection
//
// The first address on the interface that belongs to the requested family
// and passes address validation wins. IPv6 link-local addresses (fe80::/10)
// therefore never come back from here.
//
// ## Platform Support
//
// Interfaces are enumerated through `if-addrs`, which covers unix and
// Windows. A failed enumeration counts like any other failed source.

use async_trait::async_trait;
use dyndns_core::address::{self, IpFamily};
use dyndns_core::traits::IpSource;
use dyndns_core::{Error, Result};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

/// Enumerates the addresses of a named interface
pub type AddressLookup = Arc<dyn Fn(&str) -> std::io::Result<Vec<IpAddr>> + Send + Sync>;

/// Address of a local network interface
#[derive(Clone)]
pub struct InterfaceIpSource {
    interface: String,
    lookup: AddressLookup,
}

impl fmt::Debug for InterfaceIpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceIpSource")
            .field("interface", &self.interface)
            .finish()
    }
}

impl InterfaceIpSource {
    /// Read addresses of `interface` from the operating system
    pub fn new(interface: impl Into<String>) -> Self {
        Self::with_lookup(interface, Arc::new(system_addresses))
    }

    /// Use a custom address enumerator
    pub fn with_lookup(interface: impl Into<String>, lookup: AddressLookup) -> Self {
        Self {
            interface: interface.into(),
            lookup,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

#[async_trait]
impl IpSource for InterfaceIpSource {
    async fn fetch(&self, family: IpFamily) -> Result<String> {
        let addresses = (self.lookup)(&self.interface).map_err(|e| {
            Error::ip_source(format!("cannot enumerate interface {}: {}", self.interface, e))
        })?;
        debug!(
            "Interface {} has {} address(es)",
            self.interface,
            addresses.len()
        );

        addresses
            .into_iter()
            .filter_map(|ip| address::validate_ip(ip).ok())
            .find(|a| a.family() == family)
            .map(|a| a.to_string())
            .ok_or_else(|| {
                Error::ip_source(format!(
                    "no usable {} address on interface {}",
                    family, self.interface
                ))
            })
    }

    fn describe(&self) -> String {
        format!("interface {}", self.interface)
    }
}

fn system_addresses(interface: &str) -> std::io::Result<Vec<IpAddr>> {
    Ok(if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| iface.name == interface)
        .map(|iface| iface.ip())
        .collect())
}
