//! Sentinel files publish a probe's stabilised state to the failover daemon.
//!
//! The daemon's track scripts only test for existence, so the file is empty.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SentinelFile {
    path: PathBuf,
}

impl SentinelFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create or remove the file. Both directions are idempotent.
    pub async fn set(&self, present: bool) -> io::Result<()> {
        if present {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&self.path, b"").await
        } else {
            match tokio::fs::remove_file(&self.path).await {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            }
        }
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_set_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = SentinelFile::new(dir.path().join("run/ready"));

        assert_ok!(sentinel.set(true).await);
        assert!(sentinel.exists().await);
        assert_ok!(sentinel.set(true).await);

        assert_ok!(sentinel.set(false).await);
        assert!(!sentinel.exists().await);
        assert_ok!(sentinel.set(false).await);
    }
}
