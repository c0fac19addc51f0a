//! vip-lease binary
//!
//! Usage: `vip-lease CONFIG`. Prints the leased VIPs as JSON on success.

use std::path::PathBuf;
use vip_lease::{Dhclient, IpCommandLinks, LeaseConfig, LeaseManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: vip-lease CONFIG");
        return Err("missing configuration path".into());
    };

    let config = match LeaseConfig::load_from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(e.into());
        }
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    common::logging::init_with(level, common::logging::wants_json(config.logging.format.as_deref()));

    tracing::info!(
        cluster = %config.cluster_name,
        uplink = %config.uplink,
        roles = config.roles.len(),
        "Ensuring VIP leases"
    );

    let manager = LeaseManager::new(
        IpCommandLinks::new(),
        Dhclient::new(&config.dhcp.program, config.dhcp.timeout),
        &config.cluster_name,
        &config.uplink,
        &config.lease_dir,
    );

    match manager.ensure_all(&config.roles).await {
        Ok(leased) => {
            println!("{}", serde_json::to_string_pretty(&leased)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to lease VIPs");
            Err(e.into())
        }
    }
}
