//! Health check types and the rise/fall hysteresis state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    /// Probe passed
    Healthy,
    /// Probe ran and failed
    Unhealthy,
    /// Probe did not finish in time
    Timeout,
    /// Probe could not be run
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStatus::Healthy => write!(f, "HEALTHY"),
            CheckStatus::Unhealthy => write!(f, "UNHEALTHY"),
            CheckStatus::Timeout => write!(f, "TIMEOUT"),
            CheckStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of a single probe
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub duration: Duration,
    pub message: Option<String>,
}

impl CheckResult {
    pub fn healthy(duration: Duration) -> Self {
        Self {
            status: CheckStatus::Healthy,
            duration,
            message: None,
        }
    }

    pub fn unhealthy(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Unhealthy,
            duration,
            message: Some(message.into()),
        }
    }

    pub fn timeout(duration: Duration) -> Self {
        Self {
            status: CheckStatus::Timeout,
            duration,
            message: Some("Health check timed out".to_string()),
        }
    }

    pub fn error(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            duration,
            message: Some(message.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == CheckStatus::Healthy
    }
}

/// Asymmetric rise/fall thresholds.
///
/// `rise` depends on whether this node currently holds the VIP: recovering
/// while holding it should be quick, claiming readiness while not holding it
/// should be cautious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Consecutive failures that flip healthy to unhealthy
    pub fall: u32,

    /// Consecutive successes that flip back while holding the VIP
    pub rise_holding: u32,

    /// Consecutive successes that flip back while not holding the VIP
    pub rise_not_holding: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            fall: 3,
            rise_holding: 2,
            rise_not_holding: 5,
        }
    }
}

impl Thresholds {
    /// Same rise whatever the VIP ownership.
    pub fn symmetric(rise: u32, fall: u32) -> Self {
        Self {
            fall,
            rise_holding: rise,
            rise_not_holding: rise,
        }
    }

    pub fn rise(&self, holds_vip: bool) -> u32 {
        if holds_vip {
            self.rise_holding
        } else {
            self.rise_not_holding
        }
    }
}

/// Hysteresis-stabilised health of one probe.
///
/// Starts unhealthy. Only the owning probe task mutates it.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    healthy: bool,
    consecutive_passes: u32,
    consecutive_fails: u32,
    thresholds: Thresholds,
}

impl HealthStatus {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            healthy: false,
            consecutive_passes: 0,
            consecutive_fails: 0,
            thresholds,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn consecutive_passes(&self) -> u32 {
        self.consecutive_passes
    }

    pub fn consecutive_fails(&self) -> u32 {
        self.consecutive_fails
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Record one poll. Returns the new state when it flipped.
    pub fn record(&mut self, passed: bool, holds_vip: bool) -> Option<bool> {
        if passed {
            self.consecutive_passes += 1;
            self.consecutive_fails = 0;
            if !self.healthy && self.consecutive_passes >= self.thresholds.rise(holds_vip) {
                return Some(self.flip(true));
            }
        } else {
            self.consecutive_fails += 1;
            self.consecutive_passes = 0;
            if self.healthy && self.consecutive_fails >= self.thresholds.fall {
                return Some(self.flip(false));
            }
        }
        None
    }

    fn flip(&mut self, healthy: bool) -> bool {
        self.healthy = healthy;
        self.consecutive_passes = 0;
        self.consecutive_fails = 0;
        healthy
    }
}

/// Probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Name used in logs and metrics
    pub name: String,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(flatten)]
    pub thresholds: Thresholds,

    /// File whose existence publishes the healthy state
    pub sentinel: PathBuf,
}

impl ProbeConfig {
    /// Readiness probe defaults: 2s interval, fall 3, adaptive rise.
    pub fn readiness(sentinel: impl Into<PathBuf>) -> Self {
        Self {
            name: "readiness".to_string(),
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(1),
            thresholds: Thresholds::default(),
            sentinel: sentinel.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flips_unhealthy_after_exactly_fall_failures() {
        let mut status = HealthStatus::new(Thresholds::symmetric(1, 3));
        assert_eq!(status.record(true, false), Some(true));

        assert_eq!(status.record(false, false), None);
        assert_eq!(status.record(false, false), None);
        assert_eq!(status.record(false, false), Some(false));
        assert!(!status.is_healthy());
    }

    #[test]
    fn test_rise_depends_on_vip_ownership() {
        let thresholds = Thresholds {
            fall: 3,
            rise_holding: 2,
            rise_not_holding: 5,
        };

        let mut holder = HealthStatus::new(thresholds);
        assert_eq!(holder.record(true, true), None);
        assert_eq!(holder.record(true, true), Some(true));

        let mut other = HealthStatus::new(thresholds);
        for _ in 0..4 {
            assert_eq!(other.record(true, false), None);
        }
        assert_eq!(other.record(true, false), Some(true));
    }

    #[test]
    fn test_interrupted_streak_restarts() {
        let mut status = HealthStatus::new(Thresholds::symmetric(3, 3));
        status.record(true, false);
        status.record(true, false);
        status.record(false, false);
        assert_eq!(status.consecutive_passes(), 0);
        assert_eq!(status.record(true, false), None);
        assert_eq!(status.record(true, false), None);
        assert_eq!(status.record(true, false), Some(true));
    }

    #[test]
    fn test_counters_reset_on_transition() {
        let mut status = HealthStatus::new(Thresholds::symmetric(2, 2));
        status.record(true, false);
        status.record(true, false);
        assert_eq!(status.consecutive_passes(), 0);
        assert_eq!(status.record(true, false), None);
    }

    #[test]
    fn test_check_status_display() {
        assert_eq!(CheckStatus::Healthy.to_string(), "HEALTHY");
        assert_eq!(CheckStatus::Timeout.to_string(), "TIMEOUT");
    }
}
