//! Hierarchical node addressing
//!
//! Every node is identified by a 4-octet [`Address`]. The first three octets
//! form the [`SubnetPrefix`] naming a downstream domain; the last octet is the
//! host id within that domain.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ octet 0  │ octet 1  │ octet 2  │ octet 3  │
//! ├──────────┴──────────┴──────────┼──────────┤
//! │          subnet prefix         │ host id  │
//! └────────────────────────────────┴──────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::RelayError;

/// 4-octet node address
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 4]);

impl Address {
    /// Unset address (all 0x00)
    pub const UNSPECIFIED: Address = Address([0, 0, 0, 0]);

    /// Host id marking a node as the gateway of its own subnet
    pub const GATEWAY_HOST_ID: u8 = 1;

    /// Host id used for subnet-wide broadcast
    pub const BROADCAST_HOST_ID: u8 = 255;

    /// Create an address from four octets
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        Address([a, b, c, d])
    }

    /// Create an address from raw bytes
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Address(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Get a single octet, `None` past the fourth
    pub fn octet(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// Subnet prefix (octets 0..=2)
    pub fn prefix(&self) -> SubnetPrefix {
        SubnetPrefix([self.0[0], self.0[1], self.0[2]])
    }

    /// Host id (octet 3)
    pub fn host_id(&self) -> u8 {
        self.0[3]
    }

    /// Check whether two addresses share a subnet prefix
    pub fn same_subnet(&self, other: &Address) -> bool {
        self.prefix() == other.prefix()
    }

    /// Check if this is the unset address
    pub fn is_unspecified(&self) -> bool {
        *self == Self::UNSPECIFIED
    }
}

/// Prefix of an address, free function form
pub fn subnet_of(address: Address) -> SubnetPrefix {
    address.prefix()
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl From<Ipv4Addr> for Address {
    fn from(ip: Ipv4Addr) -> Self {
        Address(ip.octets())
    }
}

impl From<Address> for Ipv4Addr {
    fn from(address: Address) -> Self {
        Ipv4Addr::from(address.0)
    }
}

impl FromStr for Address {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Ipv4Addr>()
            .map(Address::from)
            .map_err(|e| RelayError::Config(format!("invalid address '{}': {}", s, e)))
    }
}

impl TryFrom<String> for Address {
    type Error = RelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

/// First three octets of an address, naming a downstream domain
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubnetPrefix([u8; 3]);

impl SubnetPrefix {
    /// Create a prefix from three octets
    pub const fn new(a: u8, b: u8, c: u8) -> Self {
        SubnetPrefix([a, b, c])
    }

    /// Get the raw prefix octets
    pub fn octets(&self) -> [u8; 3] {
        self.0
    }

    /// Build the address of `host_id` inside this prefix
    pub fn host(&self, host_id: u8) -> Address {
        Address([self.0[0], self.0[1], self.0[2], host_id])
    }

    /// Subnet-wide broadcast address (`prefix.255`)
    pub fn broadcast(&self) -> Address {
        self.host(Address::BROADCAST_HOST_ID)
    }

    /// Check whether an address falls inside this prefix
    pub fn contains(&self, address: &Address) -> bool {
        address.prefix() == *self
    }
}

impl fmt::Debug for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubnetPrefix({})", self)
    }
}

impl fmt::Display for SubnetPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

/// Downstream subnet owned by a node: prefix plus netmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    /// Subnet prefix
    pub prefix: SubnetPrefix,
    /// Netmask advertised when the downstream domain is opened
    pub netmask: Address,
}

impl Subnet {
    /// The only netmask this network uses
    pub const NETMASK: Address = Address([255, 255, 255, 0]);

    /// Create a /24 subnet for the given prefix
    pub fn new(prefix: SubnetPrefix) -> Self {
        Self {
            prefix,
            netmask: Self::NETMASK,
        }
    }

    /// Subnet containing `address`
    pub fn of(address: Address) -> Self {
        Self::new(address.prefix())
    }

    /// Check whether an address belongs to this subnet
    pub fn contains(&self, address: &Address) -> bool {
        self.prefix.contains(address)
    }

    /// Broadcast address of this subnet
    pub fn broadcast(&self) -> Address {
        self.prefix.broadcast()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.0/{}", self.prefix, self.netmask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_accessors() {
        let a = Address::new(192, 168, 5, 7);
        assert_eq!(a.prefix(), SubnetPrefix::new(192, 168, 5));
        assert_eq!(a.host_id(), 7);
        assert_eq!(a.octet(2), Some(5));
        assert_eq!(a.octet(3), Some(7));
        assert_eq!(a.octet(4), None);
        assert_eq!(a.to_string(), "192.168.5.7");
    }

    #[test]
    fn test_shared_prefix_means_same_subnet() {
        for host_a in [0u8, 1, 7, 128, 255] {
            for host_b in [0u8, 2, 9, 200, 255] {
                let a = Address::new(10, 20, 30, host_a);
                let b = Address::new(10, 20, 30, host_b);
                assert_eq!(subnet_of(a), subnet_of(b));
                assert!(a.same_subnet(&b));
            }
        }
        assert_ne!(
            subnet_of(Address::new(10, 20, 30, 1)),
            subnet_of(Address::new(10, 20, 31, 1))
        );
    }

    #[test]
    fn test_broadcast_address() {
        let subnet = Subnet::of(Address::new(192, 168, 5, 1));
        assert_eq!(subnet.broadcast(), Address::new(192, 168, 5, 255));
        assert_eq!(subnet.netmask, Address::new(255, 255, 255, 0));
        assert!(subnet.contains(&Address::new(192, 168, 5, 42)));
        assert!(!subnet.contains(&Address::new(192, 168, 6, 42)));
    }

    #[test]
    fn test_parse_and_display() {
        let a: Address = "172.16.0.4".parse().unwrap();
        assert_eq!(a, Address::new(172, 16, 0, 4));
        assert!("172.16.0".parse::<Address>().is_err());
        assert!("not-an-address".parse::<Address>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let a = Address::new(192, 168, 4, 1);
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"192.168.4.1\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
