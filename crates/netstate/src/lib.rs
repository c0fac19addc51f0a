//! Local network state: interface/route inspection and node address selection.
//!
//! The [`NetworkInspector`] trait is the boundary to the kernel tables;
//! [`NetlinkInspector`] implements it over rtnetlink. The
//! [`NodeAddressSelector`] is a pure algorithm on top of whatever inspector it
//! is given.
//!
//! # Example
//!
//! ```no_run
//! use netstate::{NetlinkInspector, NodeAddressSelector};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let selector = NodeAddressSelector::new(NetlinkInspector::new());
//!
//! // Address on the API VIP subnet, or the default route address
//! let chosen = selector.select(&["192.168.1.101".parse()?])?;
//! println!("node ip: {}", chosen[0].address);
//! # Ok(())
//! # }
//! ```

pub mod inspector;
mod netlink;
pub mod selector;
pub mod types;

pub use inspector::{
    AddressFilter, NetworkInspector, StaticInspector, non_deprecated_address, valid_node_address,
};
pub use netlink::NetlinkInspector;
pub use selector::{NodeAddressSelector, preferred_family};
pub use types::{InterfaceAddress, IpFamily, NodeAddress, Prefix, Route, RouteProtocol};
