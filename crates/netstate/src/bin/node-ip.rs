//! Prints the address(es) this node presents for the given VIPs.
//!
//! Usage: `node-ip [--prefer-ipv6] [VIP...]`. Without VIPs the default
//! route decides.

use netstate::{NetlinkInspector, NodeAddressSelector};
use std::net::IpAddr;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::logging::init();

    let mut prefer_ipv6 = false;
    let mut vips: Vec<IpAddr> = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--prefer-ipv6" {
            prefer_ipv6 = true;
        } else {
            vips.push(arg.parse()?);
        }
    }

    let selector = NodeAddressSelector::new(NetlinkInspector::new());
    let chosen = if vips.is_empty() {
        selector.select_default(prefer_ipv6)?
    } else {
        selector.select(&vips)?
    };

    for address in chosen {
        println!("{}", address.address);
    }

    Ok(())
}
