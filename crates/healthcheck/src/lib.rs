//! Health signalling for the failover daemon.
//!
//! Each probe is polled on its own task. Results pass through rise/fall
//! hysteresis ([`HealthStatus`]) and the stabilised state is published as the
//! presence of a sentinel file, which the failover daemon's track scripts test.
//!
//! Probe kinds:
//! - TCP connect
//! - HTTP(S) readiness endpoints
//! - Firewall rule presence
//!
//! # Example
//!
//! ```no_run
//! use healthcheck::{HttpChecker, NotHolding, ProbeConfig, SentinelMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example() -> common::Result<()> {
//! let config = ProbeConfig::readiness("/run/runtimecfg/api-ready");
//! let checker = Arc::new(HttpChecker::new("https://127.0.0.1:6443/readyz", Duration::from_secs(1))?);
//!
//! let monitor = SentinelMonitor::new(checker, &config, Arc::new(NotHolding));
//! tokio::spawn(monitor.run());
//! # Ok(())
//! # }
//! ```

pub mod checkers;
pub mod monitor;
pub mod sentinel;
pub mod types;

pub use checkers::{FirewallChecker, HealthChecker, HttpChecker, TcpChecker};
pub use monitor::{NotHolding, SentinelMonitor, VipOwnership};
pub use sentinel::SentinelFile;
pub use types::{CheckResult, CheckStatus, HealthStatus, ProbeConfig, Thresholds};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_result() {
        let result = CheckResult::healthy(std::time::Duration::from_millis(100));
        assert!(result.is_healthy());
        assert!(result.message.is_none());

        let result = CheckResult::timeout(std::time::Duration::from_millis(100));
        assert_eq!(result.status, CheckStatus::Timeout);
        assert!(!result.is_healthy());
    }

    #[test]
    fn test_default_thresholds() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.fall, 3);
        assert!(thresholds.rise(true) < thresholds.rise(false));
    }
}
