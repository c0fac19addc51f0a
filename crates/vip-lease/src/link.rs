//! Virtual interface management.

use async_trait::async_trait;
use common::{Error, Result};
use nix::errno::Errno;
use nix::net::if_::if_nametoindex;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Link operations the lease manager needs from the host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LinkOps: Send + Sync {
    /// Whether an interface with this name exists.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Create a bridge-mode macvlan named `name` on `uplink` with the given MAC.
    async fn create_macvlan(&self, name: &str, uplink: &str, mac: &str) -> Result<()>;

    /// Set the interface administratively up.
    async fn set_up(&self, name: &str) -> Result<()>;
}

/// [`LinkOps`] backed by the `ip` command.
pub struct IpCommandLinks {
    program: PathBuf,
}

impl IpCommandLinks {
    pub fn new() -> Self {
        Self::with_program("ip")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    async fn ip(&self, args: &[&str]) -> Result<()> {
        debug!(program = %self.program.display(), ?args, "Running link command");
        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(Error::netlink(format!(
                "{} {} exited with {}: {}",
                self.program.display(),
                args.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl Default for IpCommandLinks {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkOps for IpCommandLinks {
    async fn exists(&self, name: &str) -> Result<bool> {
        match if_nametoindex(name) {
            Ok(_) => Ok(true),
            Err(Errno::ENODEV) | Err(Errno::ENXIO) => Ok(false),
            Err(e) => Err(Error::netlink(format!("looking up {}: {}", name, e))),
        }
    }

    async fn create_macvlan(&self, name: &str, uplink: &str, mac: &str) -> Result<()> {
        self.ip(&[
            "link", "add", name, "link", uplink, "address", mac, "type", "macvlan", "mode", "bridge",
        ])
        .await
    }

    async fn set_up(&self, name: &str) -> Result<()> {
        self.ip(&["link", "set", name, "up"]).await
    }
}
