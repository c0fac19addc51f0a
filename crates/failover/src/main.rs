//! Failover monitor binary
//!
//! Usage: `failover-monitor [CONFIG]`. Without a path the default search
//! locations are tried.

use failover::{Config, FailoverMonitor, setup_tracing};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);

    // Tracing is not initialized yet
    let config = match Config::load(explicit.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    let log_level = config.logging.level.clone().unwrap_or_else(|| "info".to_string());
    let json = common::logging::wants_json(config.logging.format.as_deref());
    let _telemetry_guard = setup_tracing(&config.telemetry, &log_level, json)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Failover monitor starting");

    if let Err(e) = FailoverMonitor::new(config).run().await {
        tracing::error!(error = %e, "Failover monitor stopped on a fatal error");
        return Err(e.into());
    }

    tracing::info!("Failover monitor stopped");
    Ok(())
}
