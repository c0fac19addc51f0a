//! rtnetlink communication layer for the network inspector.
//!
//! Dumps links, addresses and routes over a `NETLINK_ROUTE` socket and
//! decodes them into the crate's typed views. A fresh socket is opened per
//! inspection so results never leak between calls.

use crate::inspector::NetworkInspector;
use crate::types::{InterfaceAddress, IpFamily, Prefix, Route, RouteProtocol};
use common::{Error, Result};
use netlink_packet_core::{NLM_F_DUMP, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload};
use netlink_packet_route::{
    AddressFamily, RouteNetlinkMessage,
    address::{AddressAttribute, AddressMessage},
    link::{LinkAttribute, LinkMessage},
    route::{RouteAddress, RouteAttribute, RouteMessage},
};
use netlink_sys::{Socket, SocketAddr, protocols::NETLINK_ROUTE};
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, trace};

/// IFA_F_DEPRECATED
const IFA_F_DEPRECATED: u32 = 0x20;
/// IFA_F_TENTATIVE
const IFA_F_TENTATIVE: u32 = 0x40;
/// RT_TABLE_MAIN
const RT_TABLE_MAIN: u32 = 254;

/// Inspector backed by the kernel's rtnetlink tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetlinkInspector;

impl NetlinkInspector {
    pub fn new() -> Self {
        Self
    }
}

impl NetworkInspector for NetlinkInspector {
    fn addresses(&self) -> Result<Vec<InterfaceAddress>> {
        let mut socket = RouteSocket::new()?;
        let names = socket.link_names()?;
        let messages =
            socket.dump(RouteNetlinkMessage::GetAddress(AddressMessage::default()))?;

        let addresses: Vec<InterfaceAddress> = messages
            .into_iter()
            .filter_map(|msg| match msg {
                RouteNetlinkMessage::NewAddress(msg) => decode_address(msg, &names),
                _ => None,
            })
            .collect();

        debug!(count = addresses.len(), "Enumerated interface addresses");
        Ok(addresses)
    }

    fn routes(&self) -> Result<Vec<Route>> {
        let mut socket = RouteSocket::new()?;
        let messages = socket.dump(RouteNetlinkMessage::GetRoute(RouteMessage::default()))?;

        let routes: Vec<Route> = messages
            .into_iter()
            .flat_map(|msg| match msg {
                RouteNetlinkMessage::NewRoute(msg) => decode_route(msg),
                _ => Vec::new(),
            })
            .collect();

        debug!(count = routes.len(), "Enumerated main table routes");
        Ok(routes)
    }
}

/// Netlink socket wrapper for route-family dumps.
struct RouteSocket {
    socket: Socket,
    sequence: u32,
}

impl RouteSocket {
    fn new() -> Result<Self> {
        let mut socket = Socket::new(NETLINK_ROUTE)
            .map_err(|e| Error::netlink(format!("Failed to create netlink socket: {}", e)))?;

        socket
            .bind_auto()
            .map_err(|e| Error::netlink(format!("Failed to bind netlink socket: {}", e)))?;

        socket
            .connect(&SocketAddr::new(0, 0))
            .map_err(|e| Error::netlink(format!("Failed to connect netlink socket: {}", e)))?;

        Ok(Self {
            socket,
            sequence: 0,
        })
    }

    fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Map of link index to interface name.
    fn link_names(&mut self) -> Result<HashMap<u32, String>> {
        let messages = self.dump(RouteNetlinkMessage::GetLink(LinkMessage::default()))?;
        Ok(messages
            .into_iter()
            .filter_map(|msg| match msg {
                RouteNetlinkMessage::NewLink(link) => {
                    let index = link.header.index;
                    link.attributes.into_iter().find_map(|attr| match attr {
                        LinkAttribute::IfName(name) => Some((index, name)),
                        _ => None,
                    })
                }
                _ => None,
            })
            .collect())
    }

    /// Send a dump request and collect every reply until NLMSG_DONE.
    fn dump(&mut self, request: RouteNetlinkMessage) -> Result<Vec<RouteNetlinkMessage>> {
        let mut nlmsg = NetlinkMessage::from(request);
        nlmsg.header.flags = NLM_F_REQUEST | NLM_F_DUMP;
        nlmsg.header.sequence_number = self.next_sequence();
        nlmsg.finalize();

        let mut buf = vec![0u8; nlmsg.buffer_len()];
        nlmsg.serialize(&mut buf[..]);

        trace!(sequence = nlmsg.header.sequence_number, "Sending rtnetlink dump request");

        self.socket
            .send(&buf[..], 0)
            .map_err(|e| Error::netlink(format!("Failed to send netlink message: {}", e)))?;

        let mut replies = Vec::new();
        loop {
            let (bytes, _) = self
                .socket
                .recv_from_full()
                .map_err(|e| Error::netlink(format!("Failed to receive netlink message: {}", e)))?;

            if bytes.is_empty() {
                return Err(Error::netlink("Netlink socket closed during dump"));
            }

            let mut offset = 0;
            while offset < bytes.len() {
                let message = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&bytes[offset..])
                    .map_err(|e| {
                        Error::netlink(format!("Failed to parse netlink message: {}", e))
                    })?;
                let length = message.header.length as usize;

                match message.payload {
                    NetlinkPayload::Done(_) => return Ok(replies),
                    NetlinkPayload::Error(err) => {
                        if let Some(code) = err.code {
                            return Err(Error::netlink(format!(
                                "Netlink dump failed: error code {}",
                                code
                            )));
                        }
                    }
                    NetlinkPayload::InnerMessage(inner) => replies.push(inner),
                    _ => {}
                }

                if length == 0 {
                    break;
                }
                offset += length;
            }
        }
    }
}

fn decode_address(msg: AddressMessage, names: &HashMap<u32, String>) -> Option<InterfaceAddress> {
    let mut local = None;
    let mut address = None;
    let mut flags = u32::from(msg.header.flags.bits());

    for attr in msg.attributes {
        match attr {
            AddressAttribute::Local(ip) => local = Some(ip),
            AddressAttribute::Address(ip) => address = Some(ip),
            AddressAttribute::Flags(extended) => flags = extended.bits(),
            _ => {}
        }
    }

    // IFA_LOCAL differs from IFA_ADDRESS only on point-to-point links, where
    // it is the local end.
    let ip = local.or(address)?;
    let index = msg.header.index;

    Some(InterfaceAddress {
        link_index: index,
        interface: names
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("if{}", index)),
        address: ip,
        prefix_len: msg.header.prefix_len,
        deprecated: flags & IFA_F_DEPRECATED != 0,
        tentative: flags & IFA_F_TENTATIVE != 0,
    })
}

/// Decode one main-table route. Multipath routes yield one route per next hop.
fn decode_route(msg: RouteMessage) -> Vec<Route> {
    let family = match msg.header.address_family {
        AddressFamily::Inet => IpFamily::V4,
        AddressFamily::Inet6 => IpFamily::V6,
        _ => return Vec::new(),
    };

    let mut table = u32::from(msg.header.table);
    let mut destination = None;
    let mut gateway = None;
    let mut link_index = None;
    let mut priority = 0;
    let mut next_hops = Vec::new();

    for attr in msg.attributes {
        match attr {
            RouteAttribute::Table(t) => table = t,
            RouteAttribute::Destination(dst) => destination = route_ip(dst),
            RouteAttribute::Gateway(gw) => gateway = route_ip(gw),
            RouteAttribute::Oif(index) => link_index = Some(index),
            RouteAttribute::Priority(metric) => priority = metric,
            RouteAttribute::MultiPath(hops) => next_hops = hops,
            _ => {}
        }
    }

    if table != RT_TABLE_MAIN {
        return Vec::new();
    }

    let destination = destination.map(|ip| Prefix::new(ip, msg.header.destination_prefix_length));
    let protocol = RouteProtocol::from(u8::from(msg.header.protocol));
    let route = |link_index: u32, gateway: Option<IpAddr>| Route {
        link_index,
        family,
        destination,
        protocol,
        priority,
        gateway,
    };

    if let Some(index) = link_index {
        return vec![route(index, gateway)];
    }
    if next_hops.is_empty() {
        debug!(?destination, %family, "Skipping route without an output interface");
        return Vec::new();
    }

    next_hops
        .into_iter()
        .map(|hop| {
            let hop_gateway = hop.attributes.into_iter().find_map(|attr| match attr {
                RouteAttribute::Gateway(gw) => route_ip(gw),
                _ => None,
            });
            route(hop.interface_index, hop_gateway.or(gateway))
        })
        .collect()
}

fn route_ip(addr: RouteAddress) -> Option<IpAddr> {
    match addr {
        RouteAddress::Inet(ip) => Some(IpAddr::V4(ip)),
        RouteAddress::Inet6(ip) => Some(IpAddr::V6(ip)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_ip() {
        let v4 = RouteAddress::Inet("10.0.0.1".parse().unwrap());
        assert_eq!(route_ip(v4), Some("10.0.0.1".parse().unwrap()));
    }

    fn main_table_route(attributes: Vec<RouteAttribute>) -> RouteMessage {
        let mut msg = RouteMessage::default();
        msg.header.address_family = AddressFamily::Inet;
        msg.attributes = attributes;
        msg.attributes.push(RouteAttribute::Table(RT_TABLE_MAIN));
        msg
    }

    fn next_hop(index: u32, gateway: &str) -> netlink_packet_route::route::RouteNextHop {
        let mut hop = netlink_packet_route::route::RouteNextHop::default();
        hop.interface_index = index;
        hop.attributes = vec![RouteAttribute::Gateway(RouteAddress::Inet(gateway.parse().unwrap()))];
        hop
    }

    #[test]
    fn test_decode_single_path_default_route() {
        let routes = decode_route(main_table_route(vec![
            RouteAttribute::Oif(2),
            RouteAttribute::Gateway(RouteAddress::Inet("10.0.0.1".parse().unwrap())),
            RouteAttribute::Priority(100),
        ]));
        assert_eq!(routes.len(), 1);
        assert!(routes[0].is_default());
        assert_eq!(routes[0].link_index, 2);
        assert_eq!(routes[0].gateway, Some("10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_decode_multipath_default_route() {
        let routes = decode_route(main_table_route(vec![
            RouteAttribute::Priority(100),
            RouteAttribute::MultiPath(vec![next_hop(2, "10.0.0.1"), next_hop(3, "10.1.0.1")]),
        ]));

        let hops: Vec<(u32, Option<IpAddr>)> = routes.iter().map(|r| (r.link_index, r.gateway)).collect();
        assert_eq!(
            hops,
            vec![
                (2, Some("10.0.0.1".parse().unwrap())),
                (3, Some("10.1.0.1".parse().unwrap())),
            ]
        );
        assert!(routes.iter().all(|r| r.is_default() && r.priority == 100));
    }

    #[test]
    fn test_decode_skips_other_tables_and_interfaceless_routes() {
        let mut local = main_table_route(vec![RouteAttribute::Oif(2)]);
        local.attributes.push(RouteAttribute::Table(255));
        assert!(decode_route(local).is_empty());

        assert!(decode_route(main_table_route(vec![RouteAttribute::Priority(100)])).is_empty());
    }

    #[test]
    fn test_netlink_dump() {
        // Needs a network namespace with real interfaces; opt-in only.
        if std::env::var("NETLINK_TEST_ENABLED").is_err() {
            eprintln!("Skipping test_netlink_dump (requires NETLINK_TEST_ENABLED=1)");
            return;
        }

        let inspector = NetlinkInspector::new();
        let addresses = inspector.addresses().unwrap();
        assert!(addresses.iter().any(|a| a.address.is_loopback()));
        inspector.routes().unwrap();
    }
}
