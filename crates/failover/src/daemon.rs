//! Wiring of the reconciliation loop and its side monitors.

use crate::bootstrap::BootstrapMonitor;
use crate::cluster::{ClusterApi, ClusterIdentity, KubeClusterApi};
use crate::config::Config;
use crate::control::UnixSocketControl;
use crate::engine::{Engine, EngineChannels};
use crate::http_server::MetricsServer;
use crate::metrics::FailoverMetrics;
use crate::mode::ModeScheduler;
use crate::render::PlaceholderRenderer;
use crate::snapshot::{ResolvConf, SnapshotBuilder};
use crate::types::BootstrapSignal;
use common::{Error, Result};
use healthcheck::{
    FirewallChecker, HealthChecker, HttpChecker, NotHolding, SentinelMonitor, TcpChecker,
};
use netstate::{NetlinkInspector, NetworkInspector};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

pub struct FailoverMonitor {
    config: Config,
}

impl FailoverMonitor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Start every task and run the loop until termination or a fatal error.
    pub async fn run(self) -> Result<()> {
        let config = &self.config;
        let node_name = config
            .node_name()
            .ok_or_else(|| Error::config("node name is not configured and NODE_NAME is unset"))?;

        let metrics = Arc::new(FailoverMetrics::new());
        if config.metrics.enabled {
            let server = MetricsServer::new(metrics.clone(), config.metrics.listen_addr.clone());
            tokio::spawn(async move {
                if let Err(e) = server.run().await {
                    error!(error = %e, "Metrics server failed");
                }
            });
        }

        let identity = match (&config.cluster.name, &config.cluster.domain) {
            (Some(name), Some(domain)) => Some(ClusterIdentity::new(name, domain)),
            _ => None,
        };
        let cluster = Arc::new(KubeClusterApi::infer(identity).await?);

        self.spawn_probes(&metrics)?;

        let bootstrap = if config.node.bootstrap {
            let (monitor, rx) = self.bootstrap_monitor()?;
            tokio::spawn(monitor.run());
            rx
        } else {
            watch::channel(None).1
        };

        let mode = if config.mode.enabled {
            let (scheduler, rx) = ModeScheduler::new(
                &config.mode.hint_file,
                config.mode.interval,
                config.mode.lead,
                cluster.clone() as Arc<dyn ClusterApi>,
            );
            tokio::spawn(scheduler.run());
            rx
        } else {
            watch::channel(None).1
        };

        let (shutdown_tx, shutdown) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_termination().await;
            shutdown_tx.send_replace(true);
        });

        let builder = SnapshotBuilder::new(
            config.to_snapshot_settings(node_name),
            NetlinkInspector::new(),
            cluster,
            ResolvConf::new(&config.failover.resolv_conf),
        );
        let engine = Engine::new(
            config.to_engine_settings(),
            builder,
            PlaceholderRenderer,
            UnixSocketControl::new(&config.failover.control_socket),
        )
        .with_metrics(metrics);

        engine
            .run(EngineChannels {
                shutdown,
                bootstrap,
                mode,
            })
            .await
    }

    fn spawn_probes(&self, metrics: &Arc<FailoverMetrics>) -> Result<()> {
        let health = &self.config.health;

        if health.readiness.enabled {
            let checker = Arc::new(HttpChecker::new(&health.readiness.url, health.readiness.timeout)?);
            let ownership = match self.config.vips.api.first() {
                Some(vip) => watch_vip_ownership(
                    Arc::new(NetlinkInspector::new()),
                    *vip,
                    health.readiness.interval,
                ),
                None => watch::channel(false).1,
            };
            let holds_vip = move || *ownership.borrow();

            let monitor = SentinelMonitor::new(checker, &self.config.readiness_probe(), Arc::new(holds_vip));
            follow_probe(monitor.name(), monitor.subscribe(), metrics.clone());
            tokio::spawn(monitor.run());
        }

        if health.firewall.enabled {
            let checker = Arc::new(FirewallChecker::new(
                &health.firewall.program,
                health.firewall.args.clone(),
                health.firewall.expected_rules.clone(),
                health.firewall.timeout,
            ));
            let monitor = SentinelMonitor::new(checker, &self.config.firewall_probe(), Arc::new(NotHolding));
            follow_probe(monitor.name(), monitor.subscribe(), metrics.clone());
            tokio::spawn(monitor.run());
        }

        Ok(())
    }

    fn bootstrap_monitor(&self) -> Result<(BootstrapMonitor, watch::Receiver<Option<BootstrapSignal>>)> {
        let settings = &self.config.bootstrap;
        let api: Arc<dyn HealthChecker> = Arc::new(HttpChecker::new(&settings.api_url, settings.timeout)?);

        let secondary = match &settings.secondary {
            Some(addr) => {
                let target: SocketAddr = addr
                    .parse()
                    .map_err(|e| Error::config(format!("invalid bootstrap secondary address {}: {}", addr, e)))?;
                Some(Arc::new(TcpChecker::new(target, settings.timeout)) as Arc<dyn HealthChecker>)
            }
            None => None,
        };

        Ok(BootstrapMonitor::new(
            api,
            secondary,
            settings.interval,
            settings.failure_threshold,
        ))
    }
}

/// Track whether `vip` is configured locally, refreshed every `every`.
///
/// The netlink dump runs on the blocking pool; a failed dump counts as not
/// holding the VIP.
fn watch_vip_ownership<I>(inspector: Arc<I>, vip: IpAddr, every: Duration) -> watch::Receiver<bool>
where
    I: NetworkInspector + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        while !tx.is_closed() {
            ticker.tick().await;
            let inspector = inspector.clone();
            let held = match tokio::task::spawn_blocking(move || inspector.has_address(&vip)).await {
                Ok(Ok(held)) => held,
                Ok(Err(e)) => {
                    debug!(%vip, error = %e, "Failed to check VIP ownership");
                    false
                }
                Err(e) => {
                    debug!(%vip, error = %e, "VIP ownership check did not complete");
                    false
                }
            };
            tx.send_if_modified(|current| std::mem::replace(current, held) != held);
        }
    });
    rx
}

/// Mirror a probe's transitions into the metrics registry.
fn follow_probe(name: &str, mut state: watch::Receiver<bool>, metrics: Arc<FailoverMetrics>) {
    let name = name.to_string();
    tokio::spawn(async move {
        metrics.set_probe_state(&name, *state.borrow_and_update());
        while state.changed().await.is_ok() {
            let healthy = *state.borrow_and_update();
            metrics.set_probe_state(&name, healthy);
        }
    });
}

async fn wait_for_termination() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler, waiting for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
    }
}
