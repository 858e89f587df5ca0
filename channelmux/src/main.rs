//! Lease-reaper daemon
//!
//! Runs the periodic reconciliation sweep against the shared lease
//! store, releasing leases whose heartbeat lapsed (transport process
//! crashed without calling release). The admission and release paths
//! themselves run inside the transport processes, which embed
//! `channelmux-core` directly.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use channelmux_core::{logging, Config, LeaseReaper, RedisLeaseStore};

#[derive(Parser, Debug)]
#[command(name = "channelmux", about = "Abandoned-lease reaper for the channel multiplexer")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "CHANNELMUX_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    logging::init_logging(&config.logging)?;

    info!(url = %config.redis.url, "Connecting to lease store");
    let store = Arc::new(RedisLeaseStore::connect(&config.redis).await?);

    info!(
        ttl_seconds = config.lease.ttl_seconds,
        sweep_interval_seconds = config.lease.sweep_interval_seconds,
        "Starting lease reaper"
    );
    let reaper = LeaseReaper::new(store, config.lease.clone());

    tokio::select! {
        () = reaper.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}
