//! Periodic probing with hysteresis, publishing state through a sentinel file.

use crate::checkers::HealthChecker;
use crate::sentinel::SentinelFile;
use crate::types::{CheckResult, CheckStatus, HealthStatus, ProbeConfig};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Tells a monitor whether this node currently holds the VIP it guards.
pub trait VipOwnership: Send + Sync {
    fn holds_vip(&self) -> bool;
}

impl<F> VipOwnership for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn holds_vip(&self) -> bool {
        self()
    }
}

/// Ownership source for probes that do not care about the VIP.
pub struct NotHolding;

impl VipOwnership for NotHolding {
    fn holds_vip(&self) -> bool {
        false
    }
}

/// Probe loop owning one [`HealthStatus`].
pub struct SentinelMonitor {
    name: String,
    checker: Arc<dyn HealthChecker>,
    interval: Duration,
    status: HealthStatus,
    sentinel: SentinelFile,
    ownership: Arc<dyn VipOwnership>,
    state_tx: watch::Sender<bool>,
    stop_signal: Arc<Notify>,
}

impl SentinelMonitor {
    pub fn new(
        checker: Arc<dyn HealthChecker>,
        config: &ProbeConfig,
        ownership: Arc<dyn VipOwnership>,
    ) -> Self {
        let (state_tx, _) = watch::channel(false);
        Self {
            name: config.name.clone(),
            checker,
            interval: config.interval,
            status: HealthStatus::new(config.thresholds),
            sentinel: SentinelFile::new(config.sentinel.clone()),
            ownership,
            state_tx,
            stop_signal: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    pub fn sentinel(&self) -> &SentinelFile {
        &self.sentinel
    }

    /// Receives the stabilised state on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state_tx.subscribe()
    }

    /// Notify that ends [`SentinelMonitor::run`].
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop_signal.clone()
    }

    /// Clear any sentinel left behind by a previous run.
    pub async fn initialize(&self) -> io::Result<()> {
        self.sentinel.set(self.status.is_healthy()).await
    }

    /// Run the probe once and apply the result. Returns the new state on a transition.
    pub async fn poll_once(&mut self) -> io::Result<Option<bool>> {
        let result = self.checker.check().await;
        let holds_vip = self.ownership.holds_vip();
        self.log_result(&result);

        let Some(healthy) = self.status.record(result.is_healthy(), holds_vip) else {
            return Ok(None);
        };

        self.sentinel.set(healthy).await?;
        self.state_tx.send_replace(healthy);
        if healthy {
            info!(probe = %self.name, holds_vip, "Probe is now HEALTHY (rise threshold met)");
        } else {
            warn!(
                probe = %self.name,
                fall = self.status.thresholds().fall,
                "Probe is now UNHEALTHY (fall threshold met)"
            );
        }
        Ok(Some(healthy))
    }

    /// Probe until stopped. Sentinel write failures are logged and retried next tick.
    pub async fn run(mut self) {
        if let Err(e) = self.initialize().await {
            warn!(probe = %self.name, error = %e, "Failed to reset sentinel");
        }

        let stop_signal = self.stop_signal.clone();
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(
                            probe = %self.name,
                            path = %self.sentinel.path().display(),
                            error = %e,
                            "Failed to update sentinel"
                        );
                    }
                }
                _ = stop_signal.notified() => {
                    info!(probe = %self.name, "Probe monitor stopping");
                    break;
                }
            }
        }
    }

    fn log_result(&self, result: &CheckResult) {
        match result.status {
            CheckStatus::Healthy => debug!(
                probe = %self.name,
                duration_ms = result.duration.as_millis(),
                "Probe passed"
            ),
            CheckStatus::Unhealthy | CheckStatus::Error => debug!(
                probe = %self.name,
                kind = self.checker.name(),
                message = result.message.as_deref().unwrap_or("unknown"),
                consecutive = self.status.consecutive_fails() + 1,
                "Probe failed"
            ),
            CheckStatus::Timeout => debug!(probe = %self.name, "Probe timed out"),
        }
    }
}
