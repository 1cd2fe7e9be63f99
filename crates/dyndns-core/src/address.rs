//! Address validation
//!
//! [`validate`] is the only way to obtain an [`Address`], so every address
//! flowing through the resolver, the orchestrator and the state store has
//! been checked against its family. Link-local IPv6 (`fe80::/10`) is never
//! accepted: it is not routable and cannot be published in DNS.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// IP address family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Both families, IPv4 first
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    /// Short tag used in file names and logs ("v4" / "v6")
    pub fn tag(&self) -> &'static str {
        match self {
            IpFamily::V4 => "v4",
            IpFamily::V6 => "v6",
        }
    }

    /// DNS record type carrying this family
    pub fn record_type(&self) -> &'static str {
        match self {
            IpFamily::V4 => "A",
            IpFamily::V6 => "AAAA",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => f.write_str("IPv4"),
            IpFamily::V6 => f.write_str("IPv6"),
        }
    }
}

/// A validated IP address of a known family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    family: IpFamily,
    value: IpAddr,
}

impl Address {
    /// The address family
    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// The address itself
    pub fn value(&self) -> IpAddr {
        self.value
    }

    /// The address as IPv4, if it is one
    pub fn as_v4(&self) -> Option<Ipv4Addr> {
        match self.value {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        }
    }

    /// The address as IPv6, if it is one
    pub fn as_v6(&self) -> Option<Ipv6Addr> {
        match self.value {
            IpAddr::V6(ip) => Some(ip),
            IpAddr::V4(_) => None,
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// Validate a raw literal against a target family.
///
/// The literal must already be trimmed; surrounding whitespace is rejected.
pub fn validate(raw: &str, family: IpFamily) -> Result<Address> {
    let invalid = || Error::InvalidAddress {
        value: raw.to_string(),
        family,
    };

    let value = match family {
        IpFamily::V4 => IpAddr::V4(raw.parse::<Ipv4Addr>().map_err(|_| invalid())?),
        IpFamily::V6 => {
            let ip = raw.parse::<Ipv6Addr>().map_err(|_| invalid())?;
            if is_link_local_v6(&ip) {
                return Err(invalid());
            }
            IpAddr::V6(ip)
        }
    };

    Ok(Address { family, value })
}

/// Validate an already-parsed address (e.g. read from an interface)
pub fn validate_ip(ip: IpAddr) -> Result<Address> {
    match ip {
        IpAddr::V4(_) => Ok(Address {
            family: IpFamily::V4,
            value: ip,
        }),
        IpAddr::V6(v6) if is_link_local_v6(&v6) => Err(Error::InvalidAddress {
            value: v6.to_string(),
            family: IpFamily::V6,
        }),
        IpAddr::V6(_) => Ok(Address {
            family: IpFamily::V6,
            value: ip,
        }),
    }
}

/// `fe80::/10`
fn is_link_local_v6(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}
