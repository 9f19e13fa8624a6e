//! CIDR matching primitives backing per-service access lists.
//!
//! A [`NetworkMatcher`] is one parsed CIDR range; an [`AccessList`] is the
//! immutable set of ranges a service currently allows. Lists are replaced
//! wholesale (see `core::registry`), never mutated in place, so readers can
//! hold a snapshot without locking.

use std::{net::IpAddr, str::FromStr};

use thiserror::Error;

/// Error produced when a CIDR literal cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetParseError {
    #[error("invalid network address in '{0}'")]
    InvalidAddress(String),

    #[error("invalid prefix length in '{0}'")]
    InvalidPrefix(String),

    #[error("prefix length {prefix} out of range for {family} address")]
    PrefixOutOfRange { prefix: u8, family: &'static str },
}

/// One CIDR range (address family + prefix length).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkMatcher {
    /// Base network address
    addr: IpAddr,
    /// Prefix length (e.g., 24 for /24)
    prefix_len: u8,
}

impl NetworkMatcher {
    /// Create a matcher from an address and prefix length.
    pub fn new(addr: IpAddr, prefix_len: u8) -> Result<Self, NetParseError> {
        match addr {
            IpAddr::V4(_) if prefix_len > 32 => {
                return Err(NetParseError::PrefixOutOfRange {
                    prefix: prefix_len,
                    family: "IPv4",
                });
            }
            IpAddr::V6(_) if prefix_len > 128 => {
                return Err(NetParseError::PrefixOutOfRange {
                    prefix: prefix_len,
                    family: "IPv6",
                });
            }
            _ => {}
        }

        Ok(Self { addr, prefix_len })
    }

    /// Parse CIDR notation (e.g., "10.0.0.0/8", "2001:db8::/32").
    ///
    /// A bare address is accepted as a host route (/32 or /128).
    pub fn parse(s: &str) -> Result<Self, NetParseError> {
        if let Some((ip_str, prefix_str)) = s.split_once('/') {
            let addr = IpAddr::from_str(ip_str)
                .map_err(|_| NetParseError::InvalidAddress(s.to_string()))?;
            let prefix_len: u8 = prefix_str
                .parse()
                .map_err(|_| NetParseError::InvalidPrefix(s.to_string()))?;
            Self::new(addr, prefix_len)
        } else {
            let addr =
                IpAddr::from_str(s).map_err(|_| NetParseError::InvalidAddress(s.to_string()))?;
            let prefix_len = match addr {
                IpAddr::V4(_) => 32,
                IpAddr::V6(_) => 128,
            };
            Ok(Self { addr, prefix_len })
        }
    }

    /// Check whether an address falls inside this range.
    ///
    /// Addresses of the other family never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let net_bits = u32::from(net);
                let addr_bits = u32::from(addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u32 << (32 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let net_bits = u128::from(net);
                let addr_bits = u128::from(addr);
                let mask = if self.prefix_len == 0 {
                    0
                } else {
                    !0u128 << (128 - self.prefix_len)
                };
                (net_bits & mask) == (addr_bits & mask)
            }
            _ => false,
        }
    }
}

impl FromStr for NetworkMatcher {
    type Err = NetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NetworkMatcher::parse(s)
    }
}

impl std::fmt::Display for NetworkMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// The set of network ranges a service currently allows.
///
/// Always fully formed: an instance is either the initial empty list or the
/// complete result of one successful refresh cycle. Loopback peers bypass
/// the list unconditionally, so an empty list admits loopback and nothing
/// else.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    ranges: Vec<NetworkMatcher>,
}

impl AccessList {
    /// Build a list from already-parsed matchers.
    pub fn new(ranges: Vec<NetworkMatcher>) -> Self {
        Self { ranges }
    }

    /// Parse every entry, failing on the first invalid one.
    ///
    /// All-or-nothing: a list is never built from a partially valid input.
    pub fn parse_all<'a, I>(entries: I) -> Result<Self, NetParseError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let ranges = entries
            .into_iter()
            .map(NetworkMatcher::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    /// True iff the address is loopback or inside any contained range.
    pub fn matches(&self, addr: IpAddr) -> bool {
        if addr.is_loopback() {
            return true;
        }
        self.ranges.iter().any(|network| network.contains(addr))
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}
