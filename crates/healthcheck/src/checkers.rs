//! Probe implementations.

use crate::types::CheckResult;
use async_trait::async_trait;
use common::{Error, Result};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A single probe
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Run the probe once
    async fn check(&self) -> CheckResult;

    /// Short probe kind used in logs
    fn name(&self) -> &str;
}

/// Passes when a TCP connection can be opened.
pub struct TcpChecker {
    target: SocketAddr,
    timeout_duration: Duration,
}

impl TcpChecker {
    pub fn new(target: SocketAddr, timeout_duration: Duration) -> Self {
        Self {
            target,
            timeout_duration,
        }
    }
}

#[async_trait]
impl HealthChecker for TcpChecker {
    async fn check(&self) -> CheckResult {
        let start = Instant::now();

        match timeout(self.timeout_duration, TcpStream::connect(self.target)).await {
            Ok(Ok(_stream)) => {
                let duration = start.elapsed();
                debug!(target = %self.target, duration_ms = duration.as_millis(), "TCP probe passed");
                CheckResult::healthy(duration)
            }
            Ok(Err(e)) => {
                debug!(target = %self.target, error = %e, "TCP probe failed");
                CheckResult::unhealthy(start.elapsed(), format!("Connection failed: {}", e))
            }
            Err(_) => {
                debug!(target = %self.target, "TCP probe timed out");
                CheckResult::timeout(start.elapsed())
            }
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// Passes on a 2xx response, or one of `expected_codes` when given.
///
/// Readiness endpoints on cluster nodes serve self-signed certificates, so
/// certificate verification is off.
pub struct HttpChecker {
    url: String,
    expected_codes: Vec<u16>,
    timeout_duration: Duration,
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(url: impl Into<String>, timeout_duration: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| Error::healthcheck(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            expected_codes: Vec::new(),
            timeout_duration,
            client,
        })
    }

    pub fn with_expected_codes(mut self, codes: Vec<u16>) -> Self {
        self.expected_codes = codes;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn accepts(&self, status: reqwest::StatusCode) -> bool {
        if self.expected_codes.is_empty() {
            status.is_success()
        } else {
            self.expected_codes.contains(&status.as_u16())
        }
    }
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn check(&self) -> CheckResult {
        let start = Instant::now();

        match timeout(self.timeout_duration, self.client.get(&self.url).send()).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status = response.status();
                if self.accepts(status) {
                    debug!(url = %self.url, status = status.as_u16(), "HTTP probe passed");
                    CheckResult::healthy(duration)
                } else {
                    debug!(url = %self.url, status = status.as_u16(), "HTTP probe failed: unexpected status");
                    CheckResult::unhealthy(duration, format!("Unexpected status code: {}", status.as_u16()))
                }
            }
            Ok(Err(e)) => {
                debug!(url = %self.url, error = %e, "HTTP probe failed");
                CheckResult::error(start.elapsed(), format!("HTTP request failed: {}", e))
            }
            Err(_) => {
                debug!(url = %self.url, "HTTP probe timed out");
                CheckResult::timeout(start.elapsed())
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Passes when the output of a firewall listing contains every expected rule.
///
/// Used to confirm the API redirect rules are installed before the node
/// advertises itself as a load balancer.
pub struct FirewallChecker {
    program: String,
    args: Vec<String>,
    expected_rules: Vec<String>,
    timeout_duration: Duration,
}

impl FirewallChecker {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        expected_rules: Vec<String>,
        timeout_duration: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            expected_rules,
            timeout_duration,
        }
    }

    /// `iptables -t nat -S <chain>`
    pub fn iptables_nat(chain: &str, expected_rules: Vec<String>, timeout_duration: Duration) -> Self {
        Self::new(
            "iptables",
            vec!["-t".into(), "nat".into(), "-S".into(), chain.into()],
            expected_rules,
            timeout_duration,
        )
    }

    /// Rules not present in `listing`.
    pub fn missing_rules<'a>(&'a self, listing: &str) -> Vec<&'a str> {
        self.expected_rules
            .iter()
            .filter(|rule| !listing.lines().any(|line| line.contains(rule.as_str())))
            .map(String::as_str)
            .collect()
    }
}

#[async_trait]
impl HealthChecker for FirewallChecker {
    async fn check(&self) -> CheckResult {
        let start = Instant::now();
        let run = Command::new(&self.program).args(&self.args).kill_on_drop(true).output();

        let output = match timeout(self.timeout_duration, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(program = %self.program, error = %e, "Failed to run firewall listing");
                return CheckResult::error(start.elapsed(), format!("Failed to run {}: {}", self.program, e));
            }
            Err(_) => return CheckResult::timeout(start.elapsed()),
        };

        let duration = start.elapsed();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return CheckResult::error(
                duration,
                format!("{} exited with {}: {}", self.program, output.status, stderr.trim()),
            );
        }

        let listing = String::from_utf8_lossy(&output.stdout);
        let missing = self.missing_rules(&listing);
        if missing.is_empty() {
            CheckResult::healthy(duration)
        } else {
            debug!(missing = ?missing, "Firewall probe failed");
            CheckResult::unhealthy(duration, format!("Missing rules: {}", missing.join(", ")))
        }
    }

    fn name(&self) -> &str {
        "firewall"
    }
}
