//! CIDR prefixes and allow lists.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::NetworkError;

/// An IPv4 or IPv6 network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    /// Base address, masked to the prefix length.
    address: IpAddr,

    /// Prefix length (e.g., 24 for /24).
    prefix_len: u8,
}

impl IpPrefix {
    /// Create a new prefix.
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, NetworkError> {
        let max = max_prefix_len(&address);
        if prefix_len > max {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds {}",
                prefix_len, max
            )));
        }

        Ok(Self {
            address: mask(address, prefix_len),
            prefix_len,
        })
    }

    /// A prefix matching exactly one address.
    pub fn host(address: IpAddr) -> Self {
        Self {
            address,
            prefix_len: max_prefix_len(&address),
        }
    }

    /// Parse from CIDR notation (e.g., "10.0.0.0/8"), or a bare address.
    pub fn from_cidr(s: &str) -> Result<Self, NetworkError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            let address = IpAddr::from_str(s)
                .map_err(|_| NetworkError::InvalidAddress(s.to_string()))?;
            return Ok(Self::host(address));
        };

        let address = IpAddr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidAddress(addr_str.to_string()))?;

        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    /// Check if an address is within this prefix.
    ///
    /// IPv4-mapped IPv6 addresses match IPv4 prefixes.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = match (self.address, addr) {
            (IpAddr::V4(_), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => IpAddr::V4(v4),
                None => return false,
            },
            (_, addr) => addr,
        };
        if self.address.is_ipv4() != addr.is_ipv4() {
            return false;
        }
        mask(addr, self.prefix_len) == self.address
    }
}

impl FromStr for IpPrefix {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s.trim())
    }
}

impl std::fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

fn max_prefix_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Mask an address to a prefix length.
fn mask(addr: IpAddr, prefix_len: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from_be_bytes(v4.octets());
            let mask = if prefix_len == 0 {
                0
            } else {
                u32::MAX << (32 - prefix_len.min(32))
            };
            IpAddr::V4(Ipv4Addr::from((bits & mask).to_be_bytes()))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from_be_bytes(v6.octets());
            let mask = if prefix_len == 0 {
                0
            } else {
                u128::MAX << (128 - prefix_len.min(128))
            };
            IpAddr::V6(Ipv6Addr::from((bits & mask).to_be_bytes()))
        }
    }
}

/// Set of prefixes a peer address must fall into.
///
/// An empty list admits nobody; callers that want no filtering simply do
/// not install one.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    prefixes: Vec<IpPrefix>,
}

impl AllowList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefix.
    pub fn push(&mut self, prefix: IpPrefix) {
        self.prefixes.push(prefix);
    }

    /// Parse a comma-separated list of addresses and CIDR prefixes.
    pub fn parse(s: &str) -> Result<Self, NetworkError> {
        let prefixes = s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(IpPrefix::from_cidr)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { prefixes })
    }

    /// Returns true if any prefix contains `addr`.
    pub fn allows(&self, addr: IpAddr) -> bool {
        self.prefixes.iter().any(|p| p.contains(addr))
    }

    /// Number of prefixes.
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Returns true when no prefix is configured.
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prefix_contains() {
        let prefix = IpPrefix::from_cidr("10.1.0.0/16").unwrap();
        assert!(prefix.contains("10.1.200.3".parse().unwrap()));
        assert!(!prefix.contains("10.2.0.1".parse().unwrap()));
        assert!(!prefix.contains("2001:db8::1".parse().unwrap()));

        let v6 = IpPrefix::from_cidr("2001:db8::/32").unwrap();
        assert!(v6.contains("2001:db8::1".parse().unwrap()));
        assert!(!v6.contains("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn test_prefix_is_masked() {
        let prefix = IpPrefix::from_cidr("192.168.7.9/24").unwrap();
        assert_eq!(prefix.to_string(), "192.168.7.0/24");
    }

    #[test]
    fn test_bare_address_and_mapped_v4() {
        let host = IpPrefix::from_cidr("127.0.0.1").unwrap();
        assert!(host.contains("127.0.0.1".parse().unwrap()));
        assert!(host.contains("::ffff:127.0.0.1".parse().unwrap()));
        assert!(!host.contains("127.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_invalid_prefixes() {
        assert!(IpPrefix::from_cidr("10.0.0.0/33").is_err());
        assert!(IpPrefix::from_cidr("10.0.0.0/x").is_err());
        assert!(IpPrefix::from_cidr("not-an-ip").is_err());
        assert!(IpPrefix::from_cidr("::/129").is_err());
    }

    #[test]
    fn test_allow_list_parse() {
        let list = AllowList::parse("127.0.0.1, 10.0.0.0/8,,::1").unwrap();
        assert_eq!(list.len(), 3);
        assert!(list.allows("10.9.9.9".parse().unwrap()));
        assert!(list.allows("::1".parse().unwrap()));
        assert!(!list.allows("192.168.0.1".parse().unwrap()));
        assert!(AllowList::new().is_empty());
        assert!(!AllowList::new().allows("127.0.0.1".parse().unwrap()));
    }

    proptest! {
        #[test]
        fn prop_prefix_contains_its_base(octets in any::<[u8; 4]>(), len in 0u8..=32) {
            let addr = IpAddr::V4(Ipv4Addr::from(octets));
            let prefix = IpPrefix::new(addr, len).unwrap();
            prop_assert!(prefix.contains(addr));
        }
    }
}
