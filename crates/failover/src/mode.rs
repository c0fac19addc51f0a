//! Clock-aligned failover mode switching.
//!
//! Every node runs the same schedule against the same wall clock, so nodes
//! reading the same hint flip protocol within moments of each other without
//! talking to one another.

use crate::cluster::ClusterApi;
use crate::types::{FailoverMode, ModeUpdateRequest};
use common::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default scheduling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(600);

/// Read the `mode` key from a hint file.
///
/// Accepts `mode=unicast` and `mode: unicast` lines. A missing file, or one
/// without a `mode` key, requests nothing.
pub async fn read_mode_hint(path: &Path) -> Result<Option<FailoverMode>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    parse_mode_hint(&contents)
}

pub fn parse_mode_hint(contents: &str) -> Result<Option<FailoverMode>> {
    for line in contents.lines() {
        let Some((key, value)) = line.split_once(['=', ':']) else {
            continue;
        };
        if key.trim() == "mode" {
            let value = value.trim().trim_matches('"');
            return value
                .parse()
                .map(Some)
                .map_err(|_| Error::config(format!("invalid mode hint: {}", value)));
        }
    }
    Ok(None)
}

/// First multiple of `interval` since the epoch strictly after `now`.
pub fn next_boundary(now: SystemTime, interval: Duration) -> SystemTime {
    let step = interval.as_millis().max(1);
    let elapsed = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    let next = (elapsed / step + 1) * step;
    UNIX_EPOCH + Duration::from_millis(u64::try_from(next).unwrap_or(u64::MAX))
}

/// Time left until `at`, zero if it has passed.
pub fn until(at: SystemTime) -> Duration {
    at.duration_since(SystemTime::now()).unwrap_or_default()
}

/// Posts [`ModeUpdateRequest`]s shortly before each activation time.
pub struct ModeScheduler {
    hint_file: PathBuf,
    interval: Duration,
    lead: Duration,
    cluster: Arc<dyn ClusterApi>,
    tx: watch::Sender<Option<ModeUpdateRequest>>,
}

impl ModeScheduler {
    pub fn new(
        hint_file: impl Into<PathBuf>,
        interval: Duration,
        lead: Duration,
        cluster: Arc<dyn ClusterApi>,
    ) -> (Self, watch::Receiver<Option<ModeUpdateRequest>>) {
        let (tx, rx) = watch::channel(None);
        let scheduler = Self {
            hint_file: hint_file.into(),
            interval,
            lead,
            cluster,
            tx,
        };
        (scheduler, rx)
    }

    /// When the next check should run: half an interval past a boundary.
    pub fn next_wake(&self, now: SystemTime) -> SystemTime {
        let half = self.interval / 2;
        let wake = next_boundary(now, self.interval) - self.interval + half;
        if wake > now { wake } else { wake + self.interval }
    }

    /// Decide whether to request a mode change at `now`.
    pub async fn plan(&self, now: SystemTime) -> Result<Option<ModeUpdateRequest>> {
        let Some(mode) = read_mode_hint(&self.hint_file).await? else {
            debug!(path = %self.hint_file.display(), "No mode hint");
            return Ok(None);
        };

        if self.cluster.is_upgrade_in_progress().await? {
            info!(%mode, "Cluster upgrade in progress, deferring mode change");
            return Ok(None);
        }

        Ok(Some(ModeUpdateRequest {
            mode,
            activation: next_boundary(now, self.interval),
        }))
    }

    pub async fn run(self) {
        loop {
            tokio::time::sleep(until(self.next_wake(SystemTime::now()))).await;

            let request = match self.plan(SystemTime::now()).await {
                Ok(Some(request)) => request,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Failed to plan mode update");
                    continue;
                }
            };

            let post_at = request.activation.checked_sub(self.lead).unwrap_or(request.activation);
            tokio::time::sleep(until(post_at)).await;

            info!(mode = %request.mode, "Posting mode update request");
            self.tx.send_replace(Some(request));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockClusterApi;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_parse_mode_hint() {
        assert_eq!(parse_mode_hint("mode=unicast\n").unwrap(), Some(FailoverMode::Unicast));
        assert_eq!(parse_mode_hint("# x\nmode: multicast").unwrap(), Some(FailoverMode::Multicast));
        assert_eq!(parse_mode_hint("other=1\n").unwrap(), None);
        assert!(parse_mode_hint("mode=sometimes").is_err());
    }

    #[test]
    fn test_next_boundary() {
        let interval = Duration::from_secs(600);
        assert_eq!(next_boundary(at(1_000), interval), at(1_200));
        assert_eq!(next_boundary(at(1_200), interval), at(1_800));
    }

    #[test]
    fn test_next_wake_is_half_interval_offset() {
        let (scheduler, _rx) = ModeScheduler::new(
            "/nonexistent",
            Duration::from_secs(600),
            Duration::from_secs(30),
            Arc::new(MockClusterApi::new()),
        );
        assert_eq!(scheduler.next_wake(at(1_000)), at(1_500));
        assert_eq!(scheduler.next_wake(at(1_500)), at(2_100));
        assert_eq!(scheduler.next_wake(at(1_600)), at(2_100));
    }

    #[tokio::test]
    async fn test_plan_defers_during_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        let hint = dir.path().join("mode");
        std::fs::write(&hint, "mode=unicast\n").unwrap();

        let mut cluster = MockClusterApi::new();
        let mut upgrading = true;
        cluster.expect_is_upgrade_in_progress().times(2).returning(move || {
            let answer = upgrading;
            upgrading = false;
            Ok(answer)
        });
        let (scheduler, _rx) = ModeScheduler::new(&hint, DEFAULT_INTERVAL, Duration::from_secs(30), Arc::new(cluster));

        assert_eq!(scheduler.plan(at(1_500)).await.unwrap(), None);
        assert_eq!(
            scheduler.plan(at(1_500)).await.unwrap(),
            Some(ModeUpdateRequest {
                mode: FailoverMode::Unicast,
                activation: at(1_800),
            })
        );
    }

    #[tokio::test]
    async fn test_plan_without_hint_file() {
        let mut cluster = MockClusterApi::new();
        cluster.expect_is_upgrade_in_progress().never();
        let (scheduler, _rx) = ModeScheduler::new(
            "/nonexistent/mode",
            DEFAULT_INTERVAL,
            Duration::from_secs(30),
            Arc::new(cluster),
        );
        assert_eq!(scheduler.plan(at(1_500)).await.unwrap(), None);
    }
}
