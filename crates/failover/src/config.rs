//! Configuration loading and validation for the failover monitor

use crate::engine::EngineSettings;
use crate::snapshot::SnapshotSettings;
use crate::types::FailoverMode;
use healthcheck::{ProbeConfig, Thresholds};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub cluster: ClusterSettings,

    #[serde(default)]
    pub vips: VipSettings,

    #[serde(default)]
    pub failover: FailoverSettings,

    #[serde(default)]
    pub mode: ModeSettings,

    #[serde(default)]
    pub bootstrap: BootstrapSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.node.validate()?;
        self.vips.validate()?;
        self.failover.validate()?;
        self.mode.validate()?;
        self.bootstrap.validate()?;
        self.health.validate()?;
        Ok(())
    }
}

/// This node's identity
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NodeSettings {
    /// Name as registered in the cluster; `NODE_NAME` when unset
    #[validate(custom = "validate_node_name")]
    pub name: Option<String>,

    /// Whether this is the bootstrap node
    pub bootstrap: bool,
}

/// Cluster identity overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Cluster name; parsed from the API host when unset
    pub name: Option<String>,
    pub domain: Option<String>,

    /// Label selector matching control plane nodes
    pub control_plane_selector: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct VipSettings {
    #[validate(length(min = 1))]
    pub api: Vec<IpAddr>,

    #[validate(length(min = 1))]
    pub ingress: Vec<IpAddr>,

    pub dns: Option<IpAddr>,
}

/// Reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FailoverSettings {
    pub enable_unicast: bool,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_poll_interval")]
    pub poll_interval: Duration,

    #[validate(range(min = 1, max = 100))]
    pub debounce_threshold: u32,

    #[validate(custom = "validate_absolute_path")]
    pub config_path: PathBuf,

    #[validate(custom = "validate_absolute_path")]
    pub template_path: PathBuf,

    #[validate(custom = "validate_absolute_path")]
    pub control_socket: PathBuf,

    pub resolv_conf: PathBuf,
}

/// Clock-aligned mode switching
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ModeSettings {
    pub enabled: bool,

    pub hint_file: PathBuf,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_mode_interval")]
    pub interval: Duration,

    /// How long before activation the request is posted
    #[serde(with = "humantime_serde")]
    pub lead: Duration,
}

/// Bootstrap self-check
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BootstrapSettings {
    pub api_url: String,

    /// Secondary local service, checked with a TCP connect
    pub secondary: Option<String>,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[validate(range(min = 1, max = 1000))]
    pub failure_threshold: u32,

    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,

    #[serde(with = "humantime_serde")]
    pub retry: Duration,
}

/// Health probes published as sentinel files
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    #[validate]
    pub readiness: ReadinessSettings,

    #[validate]
    pub firewall: FirewallSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReadinessSettings {
    pub enabled: bool,
    pub url: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_probe_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[validate(range(min = 1))]
    pub fall: u32,

    #[validate(range(min = 1))]
    pub rise_holding: u32,

    #[validate(range(min = 1))]
    pub rise_not_holding: u32,

    pub sentinel: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FirewallSettings {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub expected_rules: Vec<String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_probe_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[validate(range(min = 1))]
    pub fall: u32,

    #[validate(range(min = 1))]
    pub rise: u32,

    pub sentinel: PathBuf,
}

/// Metrics endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            name: None,
            domain: None,
            control_plane_selector: "node-role.kubernetes.io/master=".to_string(),
        }
    }
}

impl Default for FailoverSettings {
    fn default() -> Self {
        Self {
            enable_unicast: false,
            poll_interval: Duration::from_secs(1),
            debounce_threshold: crate::debounce::DEFAULT_THRESHOLD,
            config_path: PathBuf::from("/etc/keepalived/keepalived.conf"),
            template_path: PathBuf::from("/config/keepalived.conf.tmpl"),
            control_socket: PathBuf::from("/var/run/keepalived/keepalived.sock"),
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
        }
    }
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            hint_file: PathBuf::from("/etc/keepalived/monitor-mode"),
            interval: crate::mode::DEFAULT_INTERVAL,
            lead: Duration::from_secs(30),
        }
    }
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            api_url: "https://localhost:6443/readyz".to_string(),
            secondary: None,
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(1),
            failure_threshold: crate::bootstrap::DEFAULT_FAILURE_THRESHOLD,
            cooldown: Duration::from_secs(5),
            retry: Duration::from_secs(1),
        }
    }
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        let thresholds = Thresholds::default();
        Self {
            enabled: true,
            url: "https://localhost:6443/readyz".to_string(),
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(1),
            fall: thresholds.fall,
            rise_holding: thresholds.rise_holding,
            rise_not_holding: thresholds.rise_not_holding,
            sentinel: PathBuf::from("/var/run/keepalived/api-ready"),
        }
    }
}

impl Default for FirewallSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            program: "iptables".to_string(),
            args: vec!["-t".into(), "nat".into(), "-S".into(), "PREROUTING".into()],
            expected_rules: Vec::new(),
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
            fall: 2,
            rise: 1,
            sentinel: PathBuf::from("/var/run/keepalived/firewall-ready"),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9465".to_string(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "failover-monitor".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

// Custom validators

fn validate_node_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("node_name_empty"));
    }
    Ok(())
}

fn validate_absolute_path(path: &Path) -> Result<(), ValidationError> {
    if !path.is_absolute() {
        return Err(ValidationError::new("path_not_absolute"));
    }
    Ok(())
}

fn validate_poll_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(100..=60_000).contains(&millis) {
        return Err(ValidationError::new("poll_interval_out_of_range"));
    }
    Ok(())
}

fn validate_probe_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.is_zero() || interval.as_secs() > 300 {
        return Err(ValidationError::new("probe_interval_out_of_range"));
    }
    Ok(())
}

fn validate_mode_interval(interval: &Duration) -> Result<(), ValidationError> {
    if interval.as_secs() < 60 {
        return Err(ValidationError::new("mode_interval_too_short"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load from `explicit` when given, otherwise from the default search paths.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            tracing::info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/runtimecfg/failover-monitor.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./failover-monitor.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/runtimecfg/failover-monitor.yaml"))
    }

    /// Node name from config, falling back to `NODE_NAME`.
    pub fn node_name(&self) -> Option<String> {
        self.node
            .name
            .clone()
            .or_else(|| std::env::var("NODE_NAME").ok())
            .filter(|n| !n.is_empty())
    }

    pub fn initial_mode(&self) -> FailoverMode {
        FailoverMode::from_unicast(self.failover.enable_unicast)
    }

    pub fn to_snapshot_settings(&self, node_name: String) -> SnapshotSettings {
        SnapshotSettings {
            node_name,
            api_vips: self.vips.api.clone(),
            ingress_vips: self.vips.ingress.clone(),
            dns_vip: self.vips.dns,
            control_plane_selector: self.cluster.control_plane_selector.clone(),
        }
    }

    pub fn to_engine_settings(&self) -> EngineSettings {
        EngineSettings {
            poll_interval: self.failover.poll_interval,
            debounce_threshold: self.failover.debounce_threshold,
            bootstrap: self.node.bootstrap,
            initial_mode: self.initial_mode(),
            config_path: self.failover.config_path.clone(),
            template_path: self.failover.template_path.clone(),
            command_retry: self.bootstrap.retry,
            command_cooldown: self.bootstrap.cooldown,
        }
    }

    pub fn readiness_probe(&self) -> ProbeConfig {
        let r = &self.health.readiness;
        ProbeConfig {
            name: "readiness".to_string(),
            interval: r.interval,
            timeout: r.timeout,
            thresholds: Thresholds {
                fall: r.fall,
                rise_holding: r.rise_holding,
                rise_not_holding: r.rise_not_holding,
            },
            sentinel: r.sentinel.clone(),
        }
    }

    pub fn firewall_probe(&self) -> ProbeConfig {
        let f = &self.health.firewall;
        ProbeConfig {
            name: "firewall".to_string(),
            interval: f.interval,
            timeout: f.timeout,
            thresholds: Thresholds::symmetric(f.rise, f.fall),
            sentinel: f.sentinel.clone(),
        }
    }
}
