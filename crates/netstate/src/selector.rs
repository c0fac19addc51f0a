//! Node address selection relative to the cluster VIPs.
//!
//! Two modes:
//! - **VIP-directed**: the first interface (by link index) with an address
//!   whose subnet contains a VIP wins. Within that interface, public
//!   addresses come before private ones, then lower addresses first.
//!   Host-length masked addresses, typical for router-advertised IPv6, are
//!   tested through the prefix of the interface's RA routes instead.
//! - **Default route**: addresses on links with a default route, ordered by
//!   route priority, link index, preferred family, gateway reachability and
//!   public-before-private. One address per family is returned.
//!
//! The ordering is total so the result never depends on the order in which
//! the kernel happened to list interfaces or addresses.

use crate::inspector::{AddressFilter, NetworkInspector, valid_node_address};
use crate::types::{InterfaceAddress, IpFamily, NodeAddress, Prefix, Route, RouteProtocol, is_private};
use common::{Error, Result};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{debug, info};

/// Family the selection should favour for a VIP list.
///
/// Fails on an empty list: there is nothing to decide from.
pub fn preferred_family(vips: &[IpAddr]) -> Result<IpFamily> {
    vips.first().map(IpFamily::of).ok_or_else(|| {
        Error::no_suitable_address("cannot choose an address family from an empty VIP list")
    })
}

/// Picks the address(es) this node presents as its own.
pub struct NodeAddressSelector<I> {
    inspector: I,
    filter: AddressFilter,
}

/// Candidate collected in default-route mode.
#[derive(Debug, Clone)]
struct FoundAddress<'a> {
    address: &'a InterfaceAddress,
    priority: u32,
    link_index: u32,
    gateway_on_subnet: bool,
}

impl<I: NetworkInspector> NodeAddressSelector<I> {
    /// Selector using [`valid_node_address`] as the address filter.
    pub fn new(inspector: I) -> Self {
        Self::with_filter(inspector, valid_node_address)
    }

    pub fn with_filter(inspector: I, filter: AddressFilter) -> Self {
        Self { inspector, filter }
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    /// Primary address first, optionally followed by one of the opposite family.
    ///
    /// An empty VIP list goes straight to default-route selection with IPv4
    /// preferred.
    pub fn select(&self, vips: &[IpAddr]) -> Result<Vec<NodeAddress>> {
        if vips.is_empty() {
            return self.select_default(false);
        }

        let family = preferred_family(vips)?;
        match self.select_routing(vips)? {
            Some(found) => Ok(found),
            None => {
                debug!(
                    vips = ?vips,
                    "No interface subnet contains the VIPs, using default route"
                );
                self.select_default(family == IpFamily::V6)
            }
        }
    }

    /// VIP-directed selection only; `Ok(None)` when no interface reaches a VIP.
    pub fn select_routing(&self, vips: &[IpAddr]) -> Result<Option<Vec<NodeAddress>>> {
        let family = preferred_family(vips)?;
        // Containment is only tested within one family; the other family
        // comes along as the secondary address.
        let targets: Vec<IpAddr> = vips
            .iter()
            .filter(|v| IpFamily::of(v) == family)
            .copied()
            .collect();

        let addresses = self.inspector.addresses()?;
        let routes = self.inspector.routes()?;

        let mut links: BTreeMap<u32, Vec<&InterfaceAddress>> = BTreeMap::new();
        for address in &addresses {
            if !(self.filter)(address) || vips.contains(&address.address) {
                continue;
            }
            links.entry(address.link_index).or_default().push(address);
        }
        for candidates in links.values_mut() {
            candidates.sort_by(|a, b| compare_on_link(a, b));
        }

        for (link_index, candidates) in &links {
            let Some(primary) = candidates
                .iter()
                .find(|a| a.family() == family && reaches_vip(a, &targets, &routes))
            else {
                continue;
            };

            let mut selected = vec![NodeAddress::from(*primary)];
            if let Some(secondary) = candidates
                .iter()
                .find(|a| a.family() == family.opposite())
            {
                selected.push(NodeAddress::from(*secondary));
            }

            info!(
                link_index = *link_index,
                interface = %primary.interface,
                addresses = ?selected.iter().map(|a| a.address).collect::<Vec<_>>(),
                "Selected node address on VIP subnet"
            );
            return Ok(Some(selected));
        }

        Ok(None)
    }

    /// Default-route selection: at most one address per family.
    pub fn select_default(&self, prefer_ipv6: bool) -> Result<Vec<NodeAddress>> {
        let addresses = self.inspector.addresses()?;
        let routes = self.inspector.routes()?;

        let mut found = Vec::new();
        for route in routes.iter().filter(|r| r.is_default()) {
            for address in addresses.iter().filter(|a| {
                a.link_index == route.link_index && a.family() == route.family && (self.filter)(a)
            }) {
                found.push(FoundAddress {
                    address,
                    priority: route.priority,
                    link_index: route.link_index,
                    gateway_on_subnet: route.gateway.is_some_and(|gw| address.contains(&gw)),
                });
            }
        }

        if found.is_empty() {
            return Err(Error::no_suitable_address(
                "no VIP is reachable and no default route carries a usable address",
            ));
        }

        let preferred = if prefer_ipv6 { IpFamily::V6 } else { IpFamily::V4 };
        found.sort_by(|a, b| compare_found(a, b, preferred));

        let mut selected: Vec<NodeAddress> = Vec::with_capacity(2);
        for candidate in &found {
            let family = candidate.address.family();
            if selected.iter().all(|s| IpFamily::of(&s.address) != family) {
                selected.push(NodeAddress::from(candidate.address));
            }
        }

        info!(
            prefer_ipv6,
            addresses = ?selected.iter().map(|a| a.address).collect::<Vec<_>>(),
            "Selected node address from default route"
        );
        Ok(selected)
    }
}

/// Whether an address's subnet (or its RA route prefix) contains a VIP.
fn reaches_vip(address: &InterfaceAddress, vips: &[IpAddr], routes: &[Route]) -> bool {
    if !address.is_host_prefix() {
        return vips.iter().any(|vip| address.contains(vip));
    }

    routes
        .iter()
        .filter(|r| {
            r.link_index == address.link_index
                && r.family == address.family()
                && r.protocol == RouteProtocol::RouterAdvertisement
                && !r.is_default()
        })
        .filter_map(|r| r.destination)
        .any(|dst| {
            let on_link = Prefix::new(address.address, dst.len);
            vips.iter().any(|vip| on_link.contains(vip))
        })
}

/// Order among addresses of one link: public before private, then by value.
fn compare_on_link(a: &InterfaceAddress, b: &InterfaceAddress) -> Ordering {
    is_private(&a.address)
        .cmp(&is_private(&b.address))
        .then(a.address.cmp(&b.address))
}

fn compare_found(a: &FoundAddress<'_>, b: &FoundAddress<'_>, preferred: IpFamily) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then(a.link_index.cmp(&b.link_index))
        .then((a.address.family() != preferred).cmp(&(b.address.family() != preferred)))
        .then(b.gateway_on_subnet.cmp(&a.gateway_on_subnet))
        .then(is_private(&a.address.address).cmp(&is_private(&b.address.address)))
        .then(a.address.address.cmp(&b.address.address))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::StaticInspector;

    fn addr(link: u32, name: &str, ip: &str, len: u8) -> InterfaceAddress {
        InterfaceAddress::new(link, name, ip.parse().unwrap(), len)
    }

    fn ra_route(link: u32, cidr: &str) -> Route {
        Route {
            link_index: link,
            family: IpFamily::V6,
            destination: Prefix::parse_cidr(cidr),
            protocol: RouteProtocol::RouterAdvertisement,
            priority: 100,
            gateway: None,
        }
    }

    #[test]
    fn test_preferred_family_empty_is_error() {
        let err = preferred_family(&[]).unwrap_err();
        assert!(err.is_no_suitable_address());
        assert_eq!(
            preferred_family(&["fd00::10".parse().unwrap()]).unwrap(),
            IpFamily::V6
        );
    }

    #[test]
    fn test_host_prefix_uses_ra_route() {
        let inspector = StaticInspector::new(
            vec![addr(2, "eth0", "fd00:1:2:3::5", 128)],
            vec![ra_route(2, "fd00:1:2:3::/64")],
        );
        let selector = NodeAddressSelector::new(inspector);

        let found = selector
            .select_routing(&["fd00:1:2:3::100".parse().unwrap()])
            .unwrap()
            .unwrap();
        assert_eq!(found[0].address, "fd00:1:2:3::5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_host_prefix_ignores_static_routes() {
        let mut route = ra_route(2, "fd00:1:2:3::/64");
        route.protocol = RouteProtocol::Static;
        let inspector =
            StaticInspector::new(vec![addr(2, "eth0", "fd00:1:2:3::5", 128)], vec![route]);
        let selector = NodeAddressSelector::new(inspector);

        assert!(
            selector
                .select_routing(&["fd00:1:2:3::100".parse().unwrap()])
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_vip_itself_is_skipped() {
        let inspector = StaticInspector::new(
            vec![
                addr(2, "eth0", "192.168.1.101", 24),
                addr(2, "eth0", "192.168.1.99", 24),
            ],
            vec![],
        );
        let selector = NodeAddressSelector::new(inspector);

        let found = selector.select(&["192.168.1.101".parse().unwrap()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].address, "192.168.1.99".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_no_vip_match_and_no_default_route() {
        let inspector = StaticInspector::new(vec![addr(2, "eth0", "10.0.0.5", 24)], vec![]);
        let selector = NodeAddressSelector::new(inspector);

        let err = selector.select(&["192.168.1.101".parse().unwrap()]).unwrap_err();
        assert!(err.is_no_suitable_address());
    }

    #[test]
    fn test_gateway_on_subnet_breaks_tie() {
        let inspector = StaticInspector::new(
            vec![
                addr(2, "eth0", "10.0.0.5", 24),
                addr(2, "eth0", "172.16.0.5", 24),
            ],
            vec![Route::default_via(2, "172.16.0.1".parse().unwrap(), 100)],
        );
        let selector = NodeAddressSelector::new(inspector);

        let found = selector.select_default(false).unwrap();
        assert_eq!(found[0].address, "172.16.0.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_public_before_private() {
        let inspector = StaticInspector::new(
            vec![
                addr(2, "eth0", "10.0.0.5", 24),
                addr(2, "eth0", "203.0.113.5", 24),
            ],
            vec![Route::default_via(2, "198.51.100.1".parse().unwrap(), 100)],
        );
        let selector = NodeAddressSelector::new(inspector);

        let found = selector.select_default(false).unwrap();
        assert_eq!(found[0].address, "203.0.113.5".parse::<IpAddr>().unwrap());
    }
}
