//! Self-check run on the bootstrap node.
//!
//! When the local API stays down the failover daemon is stopped so the VIP
//! moves to a node that can serve it; once the API answers again the daemon
//! is started back up.

use crate::types::BootstrapSignal;
use healthcheck::HealthChecker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default number of failures tolerated before stopping the daemon
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 4;

/// Counts consecutive failures and decides when to stop or restart.
#[derive(Debug, Clone)]
pub struct BootstrapTracker {
    threshold: u32,
    failures: u32,
    stopped: bool,
}

impl BootstrapTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failures: 0,
            stopped: false,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// `Stop` once failures exceed the threshold; `Start` on the first pass after that.
    pub fn record(&mut self, passed: bool) -> Option<BootstrapSignal> {
        if passed {
            self.failures = 0;
            if self.stopped {
                self.stopped = false;
                return Some(BootstrapSignal::Start);
            }
            None
        } else {
            self.failures = self.failures.saturating_add(1);
            if !self.stopped && self.failures > self.threshold {
                self.stopped = true;
                return Some(BootstrapSignal::Stop);
            }
            None
        }
    }
}

/// Polls the local API and an optional secondary service every interval.
pub struct BootstrapMonitor {
    api: Arc<dyn HealthChecker>,
    secondary: Option<Arc<dyn HealthChecker>>,
    interval: Duration,
    tracker: BootstrapTracker,
    tx: watch::Sender<Option<BootstrapSignal>>,
}

impl BootstrapMonitor {
    pub fn new(
        api: Arc<dyn HealthChecker>,
        secondary: Option<Arc<dyn HealthChecker>>,
        interval: Duration,
        threshold: u32,
    ) -> (Self, watch::Receiver<Option<BootstrapSignal>>) {
        let (tx, rx) = watch::channel(None);
        let monitor = Self {
            api,
            secondary,
            interval,
            tracker: BootstrapTracker::new(threshold),
            tx,
        };
        (monitor, rx)
    }

    /// Run both checks once and publish any resulting signal.
    pub async fn poll_once(&mut self) -> Option<BootstrapSignal> {
        let mut passed = self.api.check().await.is_healthy();
        if passed && let Some(secondary) = &self.secondary {
            passed = secondary.check().await.is_healthy();
        }
        debug!(passed, "Bootstrap self-check");

        let signal = self.tracker.record(passed)?;
        match signal {
            BootstrapSignal::Stop => warn!("Local API unreachable, requesting daemon stop"),
            BootstrapSignal::Start => info!("Local API recovered, requesting daemon start"),
        }
        self.tx.send_replace(Some(signal));
        Some(signal)
    }

    pub async fn run(mut self) {
        loop {
            tokio::time::sleep(self.interval).await;
            self.poll_once().await;
        }
    }
}
