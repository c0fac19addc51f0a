//! Failover reconciliation for a node's VIP daemon.
//!
//! A single loop builds a [`NodeSnapshot`] every tick from local routing state
//! and the cluster API, debounces changes, renders the daemon configuration
//! and asks the daemon to reload. Side monitors feed it through watch
//! channels:
//!
//! - **Mode scheduler**: clock-aligned multicast/unicast switches
//! - **Bootstrap self-check**: stops the daemon while the local API is down
//! - **Health probes**: sentinel files for the daemon's own track scripts
//!
//! Failures to reach the daemon or write its configuration end the loop; the
//! process supervisor is expected to restart it.

pub mod bootstrap;
pub mod cluster;
pub mod config;
pub mod control;
pub mod daemon;
pub mod debounce;
pub mod engine;
pub mod http_server;
pub mod metrics;
pub mod mode;
pub mod render;
pub mod snapshot;
pub mod telemetry;
pub mod types;

pub use cluster::{ClusterApi, ClusterIdentity, KubeClusterApi, NodeInfo};
pub use config::{Config, ConfigError};
pub use control::{DaemonControl, UnixSocketControl};
pub use daemon::FailoverMonitor;
pub use debounce::{ChangeTracker, Observation};
pub use engine::{Engine, EngineChannels, EngineSettings};
pub use http_server::MetricsServer;
pub use metrics::FailoverMetrics;
pub use render::{ConfigRenderer, PlaceholderRenderer};
pub use snapshot::{ResolvConf, SnapshotBuilder, SnapshotSettings, SnapshotSource, UpstreamSource};
pub use telemetry::{TelemetryGuard, setup_tracing};
pub use types::{Backend, BootstrapSignal, DaemonCommand, FailoverMode, ModeUpdateRequest, NodeSnapshot};
