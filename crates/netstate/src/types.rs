//! Typed views over the kernel address and routing tables.

use serde::Serialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address family of an IP address, route or VIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Family of a single address.
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    /// The other family.
    pub fn opposite(self) -> Self {
        match self {
            IpFamily::V4 => IpFamily::V6,
            IpFamily::V6 => IpFamily::V4,
        }
    }

    /// Prefix length of a single-host network in this family.
    pub fn host_prefix_len(self) -> u8 {
        match self {
            IpFamily::V4 => 32,
            IpFamily::V6 => 128,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "IPv4"),
            IpFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// An address plus prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    pub address: IpAddr,
    pub len: u8,
}

impl Prefix {
    pub fn new(address: IpAddr, len: u8) -> Self {
        Self { address, len }
    }

    /// Whether `ip` falls inside this network. Always false across families.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.address, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = v4_mask(self.len);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = v6_mask(self.len);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }

    /// Parse `a.b.c.d/len` or `x::y/len`.
    pub fn parse_cidr(s: &str) -> Option<Self> {
        let (addr, len) = s.trim().split_once('/')?;
        let address: IpAddr = addr.parse().ok()?;
        let len: u8 = len.parse().ok()?;
        if len > IpFamily::of(&address).host_prefix_len() {
            return None;
        }
        Some(Self { address, len })
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.len)
    }
}

fn v4_mask(len: u8) -> u32 {
    match len {
        0 => 0,
        l if l >= 32 => u32::MAX,
        l => u32::MAX << (32 - l),
    }
}

fn v6_mask(len: u8) -> u128 {
    match len {
        0 => 0,
        l if l >= 128 => u128::MAX,
        l => u128::MAX << (128 - l),
    }
}

/// One address configured on a local interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    /// Kernel link index
    pub link_index: u32,

    /// Interface name (e.g. "eth0")
    pub interface: String,

    pub address: IpAddr,
    pub prefix_len: u8,

    /// IFA_F_DEPRECATED
    pub deprecated: bool,

    /// IFA_F_TENTATIVE (duplicate address detection still running)
    pub tentative: bool,
}

impl InterfaceAddress {
    pub fn new(link_index: u32, interface: impl Into<String>, address: IpAddr, prefix_len: u8) -> Self {
        Self {
            link_index,
            interface: interface.into(),
            address,
            prefix_len,
            deprecated: false,
            tentative: false,
        }
    }

    pub fn family(&self) -> IpFamily {
        IpFamily::of(&self.address)
    }

    pub fn prefix(&self) -> Prefix {
        Prefix::new(self.address, self.prefix_len)
    }

    /// Whether the address subnet contains `ip`.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.prefix().contains(ip)
    }

    /// Host-length masks (/32, /128) say nothing about the on-link subnet.
    pub fn is_host_prefix(&self) -> bool {
        self.prefix_len >= self.family().host_prefix_len()
    }

    pub fn is_link_local(&self) -> bool {
        match self.address {
            IpAddr::V4(ip) => ip.is_link_local(),
            IpAddr::V6(ip) => ip.is_unicast_link_local(),
        }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.interface, self.address, self.prefix_len)
    }
}

/// Origin of a route (rtm_protocol).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteProtocol {
    Unspec,
    Redirect,
    Kernel,
    Boot,
    Static,
    /// Learned from an IPv6 router advertisement
    RouterAdvertisement,
    Dhcp,
    Other(u8),
}

impl From<u8> for RouteProtocol {
    fn from(raw: u8) -> Self {
        match raw {
            0 => RouteProtocol::Unspec,
            1 => RouteProtocol::Redirect,
            2 => RouteProtocol::Kernel,
            3 => RouteProtocol::Boot,
            4 => RouteProtocol::Static,
            9 => RouteProtocol::RouterAdvertisement,
            16 => RouteProtocol::Dhcp,
            other => RouteProtocol::Other(other),
        }
    }
}

/// One route from the main routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Output interface index
    pub link_index: u32,
    pub family: IpFamily,

    /// Destination network; `None` for a default route
    pub destination: Option<Prefix>,

    pub protocol: RouteProtocol,

    /// Route metric; lower wins
    pub priority: u32,

    pub gateway: Option<IpAddr>,
}

impl Route {
    /// Whether this is a default route (no destination or a /0 destination).
    pub fn is_default(&self) -> bool {
        self.destination.is_none_or(|dst| dst.len == 0)
    }

    /// Convenience constructor for a default route.
    pub fn default_via(link_index: u32, gateway: IpAddr, priority: u32) -> Self {
        Self {
            link_index,
            family: IpFamily::of(&gateway),
            destination: None,
            protocol: RouteProtocol::Boot,
            priority,
            gateway: Some(gateway),
        }
    }
}

/// An address the selector picked, with the interface carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAddress {
    pub address: IpAddr,
    pub interface: String,
}

impl From<&InterfaceAddress> for NodeAddress {
    fn from(a: &InterfaceAddress) -> Self {
        Self {
            address: a.address,
            interface: a.interface.clone(),
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.interface)
    }
}

/// Whether an address is in a private/unique-local range.
pub fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => is_private_v4(ip),
        IpAddr::V6(ip) => is_private_v6(ip),
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_private() || ip.is_loopback() || ip.is_link_local()
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    ip.is_unique_local() || ip.is_loopback() || ip.is_unicast_link_local()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_contains() {
        let net = Prefix::parse_cidr("192.168.1.0/24").unwrap();
        assert!(net.contains(&"192.168.1.101".parse().unwrap()));
        assert!(!net.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!net.contains(&"fd00::1".parse().unwrap()));

        let any = Prefix::new("0.0.0.0".parse().unwrap(), 0);
        assert!(any.contains(&"8.8.8.8".parse().unwrap()));

        let v6 = Prefix::parse_cidr("fd00:1:2:3::/64").unwrap();
        assert!(v6.contains(&"fd00:1:2:3::aa".parse().unwrap()));
        assert!(!v6.contains(&"fd00:1:2:4::aa".parse().unwrap()));
    }

    #[test]
    fn test_parse_cidr_rejects_garbage() {
        assert!(Prefix::parse_cidr("10.0.0.1").is_none());
        assert!(Prefix::parse_cidr("10.0.0.1/33").is_none());
        assert!(Prefix::parse_cidr("nope/24").is_none());
    }

    #[test]
    fn test_route_protocol_from_raw() {
        assert_eq!(RouteProtocol::from(9), RouteProtocol::RouterAdvertisement);
        assert_eq!(RouteProtocol::from(4), RouteProtocol::Static);
        assert_eq!(RouteProtocol::from(186), RouteProtocol::Other(186));
    }

    #[test]
    fn test_host_prefix_and_link_local() {
        let a = InterfaceAddress::new(2, "eth0", "fd00::5".parse().unwrap(), 128);
        assert!(a.is_host_prefix());
        let ll = InterfaceAddress::new(2, "eth0", "fe80::1".parse().unwrap(), 64);
        assert!(ll.is_link_local());
        assert!(!ll.is_host_prefix());
    }

    #[test]
    fn test_is_private() {
        assert!(is_private(&"10.1.2.3".parse().unwrap()));
        assert!(is_private(&"fd00::1".parse().unwrap()));
        assert!(!is_private(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private(&"2001:db8::1".parse().unwrap()));
    }
}
