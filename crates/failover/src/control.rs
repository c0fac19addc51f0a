//! Control channel to the failover daemon.

use crate::types::DaemonCommand;
use async_trait::async_trait;
use common::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DaemonControl: Send + Sync {
    /// Deliver one command. No response is read.
    async fn send(&self, command: DaemonCommand) -> Result<()>;
}

/// Writes line commands to the daemon's Unix stream socket, one connection per command.
pub struct UnixSocketControl {
    socket_path: PathBuf,
}

impl UnixSocketControl {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl DaemonControl for UnixSocketControl {
    async fn send(&self, command: DaemonCommand) -> Result<()> {
        let mut stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::control(format!(
                "Failed to connect to {}: {}",
                self.socket_path.display(),
                e
            ))
        })?;

        stream
            .write_all(command.as_line().as_bytes())
            .await
            .map_err(|e| Error::control(format!("Failed to send {}: {}", command, e)))?;
        stream
            .shutdown()
            .await
            .map_err(|e| Error::control(format!("Failed to close control socket: {}", e)))?;

        debug!(socket = %self.socket_path.display(), %command, "Sent daemon command");
        Ok(())
    }
}
