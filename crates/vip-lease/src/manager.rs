//! Ensures each requested VIP has a macvlan interface and a DHCP lease.

use crate::dhcp::{DhcpClient, Lease, read_lease};
use crate::link::LinkOps;
use crate::naming::{VipRole, interface_name, mac_address};
use common::{Error, Result};
use serde::Serialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of [`LeaseManager::ensure`] for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeasedVip {
    pub role: VipRole,
    pub interface: String,
    pub mac: String,
    pub lease_file: PathBuf,
    pub address: IpAddr,
}

pub struct LeaseManager<L, D> {
    links: L,
    dhcp: D,
    cluster: String,
    uplink: String,
    lease_dir: PathBuf,
}

impl<L: LinkOps, D: DhcpClient> LeaseManager<L, D> {
    pub fn new(
        links: L,
        dhcp: D,
        cluster: impl Into<String>,
        uplink: impl Into<String>,
        lease_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            links,
            dhcp,
            cluster: cluster.into(),
            uplink: uplink.into(),
            lease_dir: lease_dir.into(),
        }
    }

    pub fn lease_dir(&self) -> &Path {
        &self.lease_dir
    }

    pub fn lease_file(&self, interface: &str) -> PathBuf {
        self.lease_dir.join(format!("{}.lease", interface))
    }

    /// Hostname sent with the DHCP request.
    pub fn hostname(&self, role: VipRole) -> String {
        format!("{}-{}", self.cluster, role)
    }

    /// Create (or reuse) the interface for `role` and return its lease.
    ///
    /// An interface that already exists is not recreated, and if its lease
    /// file already holds a lease for it the DHCP client is not run again.
    pub async fn ensure(&self, role: VipRole) -> Result<LeasedVip> {
        let interface = interface_name(&self.cluster, role);
        let mac = mac_address(&interface);
        let lease_file = self.lease_file(&interface);

        let existed = self.links.exists(&interface).await?;
        if existed {
            debug!(%role, interface, "Reusing existing interface");
        } else {
            info!(%role, interface, uplink = %self.uplink, mac, "Creating macvlan interface");
            self.links.create_macvlan(&interface, &self.uplink, &mac).await?;
        }
        self.links.set_up(&interface).await?;

        let current = match read_lease(&lease_file).await? {
            Some(lease) if existed && lease.interface == interface => Some(lease),
            _ => None,
        };
        let lease = match current {
            Some(lease) => lease,
            None => {
                tokio::fs::create_dir_all(&self.lease_dir).await?;
                self.dhcp
                    .acquire(&interface, &lease_file, &self.hostname(role))
                    .await?;
                self.verify(&interface, &lease_file).await?
            }
        };

        info!(%role, interface, address = %lease.address, "VIP lease ready");
        Ok(LeasedVip {
            role,
            interface,
            mac,
            lease_file,
            address: lease.address,
        })
    }

    /// [`LeaseManager::ensure`] for every role, stopping at the first failure.
    pub async fn ensure_all(&self, roles: &[VipRole]) -> Result<Vec<LeasedVip>> {
        let mut leased = Vec::with_capacity(roles.len());
        for role in roles {
            leased.push(self.ensure(*role).await?);
        }
        Ok(leased)
    }

    async fn verify(&self, interface: &str, lease_file: &Path) -> Result<Lease> {
        match read_lease(lease_file).await? {
            Some(lease) if lease.interface == interface => Ok(lease),
            Some(lease) => Err(Error::lease(format!(
                "{} holds a lease for {}, expected {}",
                lease_file.display(),
                lease.interface,
                interface
            ))),
            None => Err(Error::lease(format!("no lease written to {}", lease_file.display()))),
        }
    }
}
