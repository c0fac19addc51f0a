//! DHCP-leased VIPs on deterministic macvlan interfaces.
//!
//! Each VIP role gets an interface named from a hash of the cluster name and
//! role, with a MAC derived from that name, so repeated runs on any node
//! request the same lease.
//!
//! ```no_run
//! use vip_lease::{Dhclient, IpCommandLinks, LeaseManager, VipRole};
//! use std::time::Duration;
//!
//! # async fn example() -> common::Result<()> {
//! let manager = LeaseManager::new(
//!     IpCommandLinks::new(),
//!     Dhclient::new(Dhclient::DEFAULT_PROGRAM, Duration::from_secs(60)),
//!     "ostest",
//!     "ens3",
//!     "/var/lib/vip-lease",
//! );
//! let vip = manager.ensure(VipRole::Api).await?;
//! println!("{} -> {}", vip.interface, vip.address);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dhcp;
pub mod link;
pub mod manager;
pub mod naming;

pub use config::{ConfigError, LeaseConfig};
pub use dhcp::{DhcpClient, Dhclient, Lease, parse_leases, read_lease};
pub use link::{IpCommandLinks, LinkOps};
pub use manager::{LeaseManager, LeasedVip};
pub use naming::{VipRole, interface_name, mac_address};
