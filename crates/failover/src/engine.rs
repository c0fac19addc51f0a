//! The reconciliation loop.
//!
//! One task owns the debounce state and is the only writer of the daemon
//! configuration and control socket. Side monitors reach it through watch
//! channels; each loop iteration services exactly one event, checked in the
//! order termination, bootstrap signal, mode update, poll tick.

use crate::control::DaemonControl;
use crate::debounce::{ChangeTracker, Observation};
use crate::metrics::FailoverMetrics;
use crate::mode::until;
use crate::render::ConfigRenderer;
use crate::snapshot::SnapshotSource;
use crate::types::{BootstrapSignal, DaemonCommand, FailoverMode, ModeUpdateRequest, NodeSnapshot};
use common::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    pub debounce_threshold: u32,
    /// Whether this node is the bootstrap node
    pub bootstrap: bool,
    /// Mode in force at startup
    pub initial_mode: FailoverMode,
    /// Rendered configuration path
    pub config_path: PathBuf,
    pub template_path: PathBuf,
    /// Delay between failed bootstrap command attempts
    pub command_retry: Duration,
    /// Pause after a bootstrap command was delivered
    pub command_cooldown: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            debounce_threshold: crate::debounce::DEFAULT_THRESHOLD,
            bootstrap: false,
            initial_mode: FailoverMode::Multicast,
            config_path: PathBuf::from("/etc/keepalived/keepalived.conf"),
            template_path: PathBuf::from("/config/keepalived.conf.tmpl"),
            command_retry: Duration::from_secs(1),
            command_cooldown: Duration::from_secs(5),
        }
    }
}

/// Receiving ends of the side-monitor channels
pub struct EngineChannels {
    /// Flips to `true` on termination; a dropped sender also terminates
    pub shutdown: watch::Receiver<bool>,
    pub bootstrap: watch::Receiver<Option<BootstrapSignal>>,
    pub mode: watch::Receiver<Option<ModeUpdateRequest>>,
}

pub struct Engine<S, R, D> {
    settings: EngineSettings,
    source: S,
    renderer: R,
    control: D,
    tracker: ChangeTracker,
    mode: FailoverMode,
    metrics: Arc<FailoverMetrics>,
}

impl<S, R, D> Engine<S, R, D>
where
    S: SnapshotSource,
    R: ConfigRenderer,
    D: DaemonControl,
{
    pub fn new(settings: EngineSettings, source: S, renderer: R, control: D) -> Self {
        let tracker = ChangeTracker::new(settings.debounce_threshold, settings.bootstrap);
        let mode = settings.initial_mode;
        Self {
            settings,
            source,
            renderer,
            control,
            tracker,
            mode,
            metrics: Arc::new(FailoverMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<FailoverMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn mode(&self) -> FailoverMode {
        self.mode
    }

    pub fn applied(&self) -> Option<&NodeSnapshot> {
        self.tracker.applied()
    }

    /// Run until termination. Apply-time I/O failures end the loop with an error.
    pub async fn run(mut self, mut channels: EngineChannels) -> Result<()> {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            mode = %self.mode,
            bootstrap = self.settings.bootstrap,
            threshold = self.tracker.threshold(),
            "Failover reconciliation started"
        );

        loop {
            tokio::select! {
                biased;

                _ = channels.shutdown.changed() => {
                    info!("Termination requested, stopping reconciliation");
                    return Ok(());
                }
                Ok(()) = channels.bootstrap.changed() => {
                    let signal = *channels.bootstrap.borrow_and_update();
                    if let Some(signal) = signal {
                        self.handle_bootstrap(signal).await;
                    }
                }
                Ok(()) = channels.mode.changed() => {
                    let request = *channels.mode.borrow_and_update();
                    if let Some(request) = request {
                        self.handle_mode_update(request).await?;
                    }
                }
                _ = ticker.tick() => {
                    self.tick().await?;
                }
            }
        }
    }

    /// One poll: build, debounce and maybe apply.
    pub async fn tick(&mut self) -> Result<()> {
        let snapshot = match self.source.build(self.mode).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to build snapshot, skipping tick");
                self.metrics.record_build_failure();
                return Ok(());
            }
        };

        let observation = self.tracker.observe(&snapshot);
        self.metrics.record_snapshot(self.tracker.pending_count());

        match observation {
            Observation::Unchanged => {}
            Observation::Rejected => {
                debug!(
                    backends = snapshot.api_backends.len(),
                    "Unicast snapshot lacks peer visibility, not applying"
                );
                self.metrics.record_rejection();
            }
            Observation::Pending(count) => {
                debug!(count, threshold = self.tracker.threshold(), "Configuration change pending");
            }
            Observation::Confirmed => {
                self.apply(&snapshot).await?;
                self.tracker.mark_applied(snapshot);
            }
        }
        Ok(())
    }

    async fn apply(&self, snapshot: &NodeSnapshot) -> Result<()> {
        let start = Instant::now();
        self.render(snapshot).await?;
        self.control.send(DaemonCommand::Reload).await?;
        self.metrics.record_command(DaemonCommand::Reload);
        self.metrics.record_apply(start.elapsed());

        let ids = snapshot.router_ids().named();
        info!(
            non_virtual_ip = %snapshot.non_virtual_ip,
            interface = %snapshot.interface,
            mode = %snapshot.mode(),
            backends = snapshot.api_backends.len(),
            router_ids = ?ids,
            "Applied failover configuration"
        );
        Ok(())
    }

    async fn render(&self, snapshot: &NodeSnapshot) -> Result<()> {
        self.renderer
            .render_file(&self.settings.config_path, &self.settings.template_path, snapshot)
            .await
    }

    /// Force `request.mode`, render immediately, reload at the activation time.
    ///
    /// A snapshot that fails the validity gate is not applied; the mode stays
    /// switched and the regular ticks apply it once it becomes valid.
    pub async fn handle_mode_update(&mut self, request: ModeUpdateRequest) -> Result<()> {
        if request.mode == self.mode {
            debug!(mode = %request.mode, "Mode update matches current mode, ignoring");
            return Ok(());
        }

        info!(from = %self.mode, to = %request.mode, "Switching failover mode");
        self.mode = request.mode;
        self.metrics.record_mode_switch(request.mode);

        let snapshot = match self.source.build(self.mode).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Failed to build snapshot for mode switch, leaving it to the next ticks");
                self.metrics.record_build_failure();
                return Ok(());
            }
        };

        if !self.tracker.accepts(&snapshot) {
            warn!(
                mode = %self.mode,
                backends = snapshot.api_backends.len(),
                "Mode switch snapshot lacks peer visibility, leaving it to the next ticks"
            );
            self.metrics.record_rejection();
            return Ok(());
        }

        self.render(&snapshot).await?;
        tokio::time::sleep(until(request.activation)).await;
        self.control.send(DaemonCommand::Reload).await?;
        self.metrics.record_command(DaemonCommand::Reload);

        info!(mode = %self.mode, "Failover mode switched");
        self.tracker.mark_applied(snapshot);
        Ok(())
    }

    /// Deliver the bootstrap command, retrying until it lands, then cool down.
    pub async fn handle_bootstrap(&mut self, signal: BootstrapSignal) {
        let command = DaemonCommand::from(signal);
        loop {
            match self.control.send(command).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(%command, error = %e, "Failed to send bootstrap command, retrying");
                    self.metrics.record_control_failure();
                    tokio::time::sleep(self.settings.command_retry).await;
                }
            }
        }

        info!(%command, "Bootstrap command delivered");
        self.metrics.record_command(command);
        tokio::time::sleep(self.settings.command_cooldown).await;
    }
}
