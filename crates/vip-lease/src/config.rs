//! YAML configuration for the `vip-lease` binary

use crate::dhcp::Dhclient;
use crate::naming::{IFNAMSIZ, VipRole};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LeaseConfig {
    #[validate(length(min = 1))]
    pub cluster_name: String,

    /// Physical interface the macvlans attach to
    #[validate(custom = "validate_interface_name")]
    pub uplink: String,

    #[serde(default = "default_lease_dir")]
    #[validate(custom = "validate_absolute_path")]
    pub lease_dir: PathBuf,

    #[validate(length(min = 1))]
    pub roles: Vec<VipRole>,

    #[serde(default)]
    #[validate]
    pub dhcp: DhcpSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DhcpSettings {
    #[validate(custom = "validate_absolute_path")]
    pub program: PathBuf,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DhcpSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from(Dhclient::DEFAULT_PROGRAM),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    /// "json" or "text"
    pub format: Option<String>,
}

fn default_lease_dir() -> PathBuf {
    PathBuf::from("/var/lib/vip-lease")
}

fn validate_interface_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > IFNAMSIZ || name.contains('/') || name.contains(' ') {
        return Err(ValidationError::new("invalid_interface_name"));
    }
    Ok(())
}

fn validate_absolute_path(path: &Path) -> Result<(), ValidationError> {
    if !path.is_absolute() {
        return Err(ValidationError::new("path_not_absolute"));
    }
    Ok(())
}

impl LeaseConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: LeaseConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }
}
