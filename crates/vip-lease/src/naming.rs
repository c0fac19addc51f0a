//! Deterministic interface names and MAC addresses for leased VIPs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Kernel limit on interface names, excluding the trailing NUL.
pub const IFNAMSIZ: usize = 15;

/// Locally administered vendor prefix used for every generated MAC.
pub const MAC_PREFIX: [u8; 3] = [0x00, 0x1a, 0x4a];

/// Which cluster VIP an interface carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VipRole {
    Api,
    Ingress,
    Dns,
    Provisioning,
}

impl VipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            VipRole::Api => "api",
            VipRole::Ingress => "ingress",
            VipRole::Dns => "dns",
            VipRole::Provisioning => "provisioning",
        }
    }

    /// Short prefix that keeps generated names recognisable in `ip link`.
    pub fn prefix(&self) -> &'static str {
        match self {
            VipRole::Api => "api",
            VipRole::Ingress => "ing",
            VipRole::Dns => "dns",
            VipRole::Provisioning => "prv",
        }
    }
}

impl fmt::Display for VipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interface name for `role` in `cluster`: role prefix followed by the hex
/// sha256 of `<cluster>-<role>`, cut to [`IFNAMSIZ`] bytes.
pub fn interface_name(cluster: &str, role: VipRole) -> String {
    let digest = Sha256::digest(format!("{}-{}", cluster, role).as_bytes());
    let mut name = format!("{}{:x}", role.prefix(), digest);
    name.truncate(IFNAMSIZ);
    name
}

/// MAC for an interface: [`MAC_PREFIX`] plus the first three bytes of sha256(name).
pub fn mac_address(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    MAC_PREFIX
        .iter()
        .chain(digest.iter().take(3))
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}
