//! Core types for the failover reconciliation loop.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::SystemTime;

/// DNS record type published for a VIP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    pub fn for_address(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Aaaa => write!(f, "AAAA"),
        }
    }
}

/// Failover protocol the daemon runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMode {
    Multicast,
    Unicast,
}

impl FailoverMode {
    pub fn from_unicast(enable_unicast: bool) -> Self {
        if enable_unicast {
            FailoverMode::Unicast
        } else {
            FailoverMode::Multicast
        }
    }

    pub fn is_unicast(self) -> bool {
        self == FailoverMode::Unicast
    }
}

impl fmt::Display for FailoverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailoverMode::Multicast => write!(f, "multicast"),
            FailoverMode::Unicast => write!(f, "unicast"),
        }
    }
}

impl FromStr for FailoverMode {
    type Err = common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multicast" => Ok(FailoverMode::Multicast),
            "unicast" => Ok(FailoverMode::Unicast),
            other => Err(common::Error::config(format!("unknown failover mode: {}", other))),
        }
    }
}

/// A cluster member eligible to serve behind a VIP.
///
/// Ordered by name then address so backend lists compare structurally.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Backend {
    pub name: String,
    pub address: IpAddr,
}

/// Virtual router IDs, one per failover instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterIds {
    pub api: u8,
    pub ingress: u8,
    pub dns: u8,
}

impl RouterIds {
    /// Named fields in a fixed order, for logging.
    pub fn named(&self) -> [(&'static str, u8); 3] {
        [
            ("api_vrid", self.api),
            ("ingress_vrid", self.ingress),
            ("dns_vrid", self.dns),
        ]
    }
}

/// Everything the daemon configuration is rendered from.
///
/// Built fresh every tick and compared structurally; never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub cluster_name: String,
    pub cluster_domain: String,

    pub api_vip: String,
    pub api_vip_record_type: RecordType,
    pub ingress_vip: String,
    pub ingress_vip_record_type: RecordType,
    pub dns_vip: String,
    pub dns_vip_record_type: RecordType,

    pub api_vrid: u8,
    pub ingress_vrid: u8,
    pub dns_vrid: u8,

    /// Node address chosen against the VIPs
    pub non_virtual_ip: String,
    /// Interface carrying `non_virtual_ip`; the daemon binds its instances here
    pub interface: String,

    /// Control plane members, sorted
    pub api_backends: Vec<Backend>,
    pub dns_upstreams: Vec<String>,
    pub enable_unicast: bool,
    /// Addresses of every other node, sorted
    pub ingress_peers: Vec<String>,
}

impl NodeSnapshot {
    pub fn mode(&self) -> FailoverMode {
        FailoverMode::from_unicast(self.enable_unicast)
    }

    pub fn router_ids(&self) -> RouterIds {
        RouterIds {
            api: self.api_vrid,
            ingress: self.ingress_vrid,
            dns: self.dns_vrid,
        }
    }
}

/// One-shot request to switch protocol at a given wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeUpdateRequest {
    pub mode: FailoverMode,
    pub activation: SystemTime,
}

/// Start/stop decision from the bootstrap self-check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapSignal {
    Stop,
    Start,
}

/// Line commands understood by the daemon's control socket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonCommand {
    Reload,
    Stop,
}

impl DaemonCommand {
    pub fn as_line(&self) -> &'static str {
        match self {
            DaemonCommand::Reload => "reload\n",
            DaemonCommand::Stop => "stop\n",
        }
    }
}

impl From<BootstrapSignal> for DaemonCommand {
    fn from(signal: BootstrapSignal) -> Self {
        match signal {
            BootstrapSignal::Stop => DaemonCommand::Stop,
            BootstrapSignal::Start => DaemonCommand::Reload,
        }
    }
}

impl fmt::Display for DaemonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_line().trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("unicast".parse::<FailoverMode>().unwrap(), FailoverMode::Unicast);
        assert_eq!(" Multicast\n".parse::<FailoverMode>().unwrap(), FailoverMode::Multicast);
        assert!("broadcast".parse::<FailoverMode>().is_err());
    }

    #[test]
    fn test_backend_ordering() {
        let mut backends = vec![
            Backend { name: "master-1".into(), address: "10.0.0.2".parse().unwrap() },
            Backend { name: "master-0".into(), address: "10.0.0.9".parse().unwrap() },
            Backend { name: "master-0".into(), address: "10.0.0.3".parse().unwrap() },
        ];
        backends.sort();
        assert_eq!(backends[0].address.to_string(), "10.0.0.3");
        assert_eq!(backends[2].name, "master-1");
    }

    #[test]
    fn test_daemon_command_lines() {
        assert_eq!(DaemonCommand::Reload.as_line(), "reload\n");
        assert_eq!(DaemonCommand::from(BootstrapSignal::Stop), DaemonCommand::Stop);
        assert_eq!(DaemonCommand::from(BootstrapSignal::Start).to_string(), "reload");
    }

    #[test]
    fn test_record_type() {
        assert_eq!(RecordType::for_address(&"fd00::5".parse().unwrap()), RecordType::Aaaa);
        assert_eq!(RecordType::A.to_string(), "A");
    }
}
