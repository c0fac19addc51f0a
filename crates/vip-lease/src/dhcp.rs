//! DHCP client invocation and lease file parsing.

use async_trait::async_trait;
use common::{Error, Result};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

/// Obtains a lease for an interface and writes it to a lease file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DhcpClient: Send + Sync {
    async fn acquire(&self, interface: &str, lease_file: &Path, hostname: &str) -> Result<()>;
}

/// Runs `dhclient -1 -v -lf <lease> -H <hostname> <iface>`.
pub struct Dhclient {
    program: PathBuf,
    timeout: Duration,
}

impl Dhclient {
    pub const DEFAULT_PROGRAM: &'static str = "/usr/sbin/dhclient";

    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn args(interface: &str, lease_file: &Path, hostname: &str) -> Vec<String> {
        vec![
            "-1".to_string(),
            "-v".to_string(),
            "-lf".to_string(),
            lease_file.display().to_string(),
            "-H".to_string(),
            hostname.to_string(),
            interface.to_string(),
        ]
    }
}

#[async_trait]
impl DhcpClient for Dhclient {
    async fn acquire(&self, interface: &str, lease_file: &Path, hostname: &str) -> Result<()> {
        let args = Self::args(interface, lease_file, hostname);
        debug!(program = %self.program.display(), ?args, "Running DHCP client");

        let run = Command::new(&self.program).args(&args).kill_on_drop(true).output();
        let output = timeout(self.timeout, run).await.map_err(|_| {
            Error::lease(format!("DHCP client for {} timed out after {:?}", interface, self.timeout))
        })??;

        if !output.status.success() {
            return Err(Error::lease(format!(
                "DHCP client for {} exited with {}: {}",
                interface,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!(interface, lease_file = %lease_file.display(), "DHCP lease acquired");
        Ok(())
    }
}

/// The interface/address pair of one lease block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub interface: String,
    pub address: IpAddr,
}

/// Returns the last complete lease in dhclient lease file syntax.
pub fn parse_leases(contents: &str) -> Option<Lease> {
    let mut latest = None;
    let mut interface: Option<String> = None;
    let mut address: Option<IpAddr> = None;

    for line in contents.lines() {
        let line = line.trim().trim_end_matches(';');
        if line.starts_with("lease") && line.ends_with('{') {
            interface = None;
            address = None;
        } else if let Some(rest) = line.strip_prefix("interface ") {
            interface = Some(rest.trim().trim_matches('"').to_string());
        } else if let Some(rest) = line.strip_prefix("fixed-address ") {
            address = rest.trim().parse().ok();
        } else if line == "}"
            && let (Some(i), Some(a)) = (interface.take(), address.take())
        {
            latest = Some(Lease { interface: i, address: a });
        }
    }
    latest
}

/// Reads `path` and returns its most recent lease, if any.
pub async fn read_lease(path: &Path) -> Result<Option<Lease>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(parse_leases(&contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASES: &str = r#"
lease {
  interface "api66f23048e1cf";
  fixed-address 192.168.111.5;
  option subnet-mask 255.255.255.0;
  renew 2 2026/10/13 10:00:00;
}
lease {
  interface "api66f23048e1cf";
  fixed-address 192.168.111.9;
  option subnet-mask 255.255.255.0;
}
"#;

    #[test]
    fn test_most_recent_lease_wins() {
        let lease = parse_leases(LEASES).unwrap();
        assert_eq!(lease.interface, "api66f23048e1cf");
        assert_eq!(lease.address, "192.168.111.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_incomplete_block_is_ignored() {
        let contents = format!("{}lease {{\n  interface \"other\";\n}}\n", LEASES);
        let lease = parse_leases(&contents).unwrap();
        assert_eq!(lease.address, "192.168.111.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_empty_file() {
        assert_eq!(parse_leases(""), None);
    }

    #[test]
    fn test_args() {
        let args = Dhclient::args("eth9", Path::new("/var/lib/leases/eth9.lease"), "ostest-api");
        assert_eq!(
            args,
            ["-1", "-v", "-lf", "/var/lib/leases/eth9.lease", "-H", "ostest-api", "eth9"]
        );
    }

    #[tokio::test]
    async fn test_read_missing_lease_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_lease(&dir.path().join("none.lease")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failing_client() {
        let dir = tempfile::tempdir().unwrap();
        let client = Dhclient::new("false", Duration::from_secs(5));
        let err = client
            .acquire("eth9", &dir.path().join("eth9.lease"), "ostest-api")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Lease(_)));
    }
}
