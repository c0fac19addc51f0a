//! Prometheus metrics for the failover monitor.

use crate::types::{DaemonCommand, FailoverMode};
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

// Counter names are registered without the `_total` suffix; the encoder adds it.

/// Labels for daemon command metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CommandLabels {
    /// Command sent (reload, stop)
    pub command: String,
}

/// Labels for mode switch metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ModeLabels {
    /// Mode switched to (unicast, multicast)
    pub mode: String,
}

/// Labels for per-probe metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    /// Probe name (readiness, firewall)
    pub probe: String,
}

/// Metrics registry with all failover monitor metrics
pub struct FailoverMetrics {
    /// Prometheus registry
    pub registry: Registry,

    snapshots_observed_total: Counter,
    snapshot_build_failures_total: Counter,
    snapshots_rejected_total: Counter,
    applies_total: Counter,
    apply_duration_seconds: Histogram,
    commands_total: Family<CommandLabels, Counter>,
    control_failures_total: Counter,
    mode_switches_total: Family<ModeLabels, Counter>,
    debounce_pending: Gauge,
    probe_healthy: Family<ProbeLabels, Gauge>,
}

impl FailoverMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let snapshots_observed_total = Counter::default();
        registry.register(
            "failover_snapshots_observed",
            "Snapshots built by the reconciliation loop",
            snapshots_observed_total.clone(),
        );

        let snapshot_build_failures_total = Counter::default();
        registry.register(
            "failover_snapshot_build_failures",
            "Ticks skipped because the snapshot could not be built",
            snapshot_build_failures_total.clone(),
        );

        let snapshots_rejected_total = Counter::default();
        registry.register(
            "failover_snapshots_rejected",
            "Snapshots rejected by the validity gate",
            snapshots_rejected_total.clone(),
        );

        let applies_total = Counter::default();
        registry.register(
            "failover_applies",
            "Configurations rendered and applied",
            applies_total.clone(),
        );

        let apply_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 12));
        registry.register(
            "failover_apply_duration_seconds",
            "Time to render the configuration and reload the daemon",
            apply_duration_seconds.clone(),
        );

        let commands_total = Family::<CommandLabels, Counter>::default();
        registry.register(
            "failover_daemon_commands",
            "Commands delivered to the failover daemon",
            commands_total.clone(),
        );

        let control_failures_total = Counter::default();
        registry.register(
            "failover_control_failures",
            "Failed attempts to reach the daemon control socket",
            control_failures_total.clone(),
        );

        let mode_switches_total = Family::<ModeLabels, Counter>::default();
        registry.register(
            "failover_mode_switches",
            "Forced failover mode switches",
            mode_switches_total.clone(),
        );

        let debounce_pending = Gauge::default();
        registry.register(
            "failover_debounce_pending",
            "Consecutive observations of the pending change",
            debounce_pending.clone(),
        );

        let probe_healthy = Family::<ProbeLabels, Gauge>::default();
        registry.register(
            "failover_probe_healthy",
            "Stabilised probe state (1=healthy, 0=unhealthy)",
            probe_healthy.clone(),
        );

        Self {
            registry,
            snapshots_observed_total,
            snapshot_build_failures_total,
            snapshots_rejected_total,
            applies_total,
            apply_duration_seconds,
            commands_total,
            control_failures_total,
            mode_switches_total,
            debounce_pending,
            probe_healthy,
        }
    }

    pub fn record_snapshot(&self, pending: u32) {
        self.snapshots_observed_total.inc();
        self.debounce_pending.set(i64::from(pending));
    }

    pub fn record_build_failure(&self) {
        self.snapshot_build_failures_total.inc();
    }

    pub fn record_rejection(&self) {
        self.snapshots_rejected_total.inc();
    }

    pub fn record_apply(&self, duration: Duration) {
        self.applies_total.inc();
        self.apply_duration_seconds.observe(duration.as_secs_f64());
        self.debounce_pending.set(0);
    }

    pub fn record_command(&self, command: DaemonCommand) {
        self.commands_total
            .get_or_create(&CommandLabels {
                command: command.to_string(),
            })
            .inc();
    }

    pub fn record_control_failure(&self) {
        self.control_failures_total.inc();
    }

    pub fn record_mode_switch(&self, mode: FailoverMode) {
        self.mode_switches_total
            .get_or_create(&ModeLabels {
                mode: mode.to_string(),
            })
            .inc();
    }

    pub fn set_probe_state(&self, probe: &str, healthy: bool) {
        self.probe_healthy
            .get_or_create(&ProbeLabels {
                probe: probe.to_string(),
            })
            .set(i64::from(healthy));
    }

    pub fn applies(&self) -> u64 {
        self.applies_total.get()
    }

    pub fn rejections(&self) -> u64 {
        self.snapshots_rejected_total.get()
    }

    pub fn commands(&self, command: DaemonCommand) -> u64 {
        self.commands_total
            .get_or_create(&CommandLabels {
                command: command.to_string(),
            })
            .get()
    }
}

impl Default for FailoverMetrics {
    fn default() -> Self {
        Self::new()
    }
}
