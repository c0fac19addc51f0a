//! Capability interface over the local address and routing tables.

use crate::types::{InterfaceAddress, IpFamily, Route};
use common::Result;
use std::net::IpAddr;
use std::sync::Arc;

/// Predicate deciding whether a local address may represent the node.
pub type AddressFilter = fn(&InterfaceAddress) -> bool;

/// Source of interface addresses and kernel routes.
///
/// Implementations must return fresh tables on every call; callers never
/// cache results across calls.
pub trait NetworkInspector: Send + Sync {
    /// All addresses on all interfaces, both families.
    fn addresses(&self) -> Result<Vec<InterfaceAddress>>;

    /// All routes in the main table, both families.
    fn routes(&self) -> Result<Vec<Route>>;

    /// Addresses configured on one link.
    fn addresses_on(&self, link_index: u32) -> Result<Vec<InterfaceAddress>> {
        Ok(self
            .addresses()?
            .into_iter()
            .filter(|a| a.link_index == link_index)
            .collect())
    }

    /// Routes leaving through one link.
    fn routes_on(&self, link_index: u32) -> Result<Vec<Route>> {
        Ok(self
            .routes()?
            .into_iter()
            .filter(|r| r.link_index == link_index)
            .collect())
    }

    /// Default routes of either family.
    fn default_routes(&self) -> Result<Vec<Route>> {
        Ok(self.routes()?.into_iter().filter(Route::is_default).collect())
    }

    /// Name of the interface carrying `ip`, if any.
    fn interface_of(&self, ip: &IpAddr) -> Result<Option<String>> {
        Ok(self
            .addresses()?
            .into_iter()
            .find(|a| a.address == *ip)
            .map(|a| a.interface))
    }

    /// Whether `ip` is configured locally (e.g. the VIP is held by this node).
    fn has_address(&self, ip: &IpAddr) -> Result<bool> {
        Ok(self.addresses()?.iter().any(|a| a.address == *ip))
    }
}

impl<T: NetworkInspector + ?Sized> NetworkInspector for Arc<T> {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        (**self).addresses()
    }

    fn routes(&self) -> Result<Vec<Route>> {
        (**self).routes()
    }
}

impl<T: NetworkInspector + ?Sized> NetworkInspector for &T {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        (**self).addresses()
    }

    fn routes(&self) -> Result<Vec<Route>> {
        (**self).routes()
    }
}

/// Usable node address: not link-local, and for IPv6 neither deprecated nor tentative.
pub fn valid_node_address(address: &InterfaceAddress) -> bool {
    if address.is_link_local() {
        return false;
    }
    match address.family() {
        IpFamily::V4 => true,
        IpFamily::V6 => !address.deprecated && !address.tentative,
    }
}

/// Looser filter that only drops deprecated addresses.
pub fn non_deprecated_address(address: &InterfaceAddress) -> bool {
    !address.deprecated
}

/// Fixed tables, for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticInspector {
    pub addresses: Vec<InterfaceAddress>,
    pub routes: Vec<Route>,
}

impl StaticInspector {
    pub fn new(addresses: Vec<InterfaceAddress>, routes: Vec<Route>) -> Self {
        Self { addresses, routes }
    }
}

impl NetworkInspector for StaticInspector {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        Ok(self.addresses.clone())
    }

    fn routes(&self) -> Result<Vec<Route>> {
        Ok(self.routes.clone())
    }
}
