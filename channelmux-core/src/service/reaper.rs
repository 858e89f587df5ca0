//! Abandoned-lease reaper
//!
//! A transport process that crashes never calls release, which would
//! leave a permanent lease and an uncollectable counter increment.
//! Every lease carries a heartbeat, renewed by fast-path acquires and
//! explicit `renew` calls; this sweep releases leases whose heartbeat
//! lapsed past the configured grace period.

use std::sync::Arc;
use std::time::Duration;

use crate::config::LeaseConfig;
use crate::metrics;
use crate::service::ReleaseHandler;
use crate::store::{unix_now, LeaseStore};
use crate::Result;

pub struct LeaseReaper {
    store: Arc<dyn LeaseStore>,
    release: ReleaseHandler,
    config: LeaseConfig,
}

impl LeaseReaper {
    pub fn new(store: Arc<dyn LeaseStore>, config: LeaseConfig) -> Self {
        Self {
            release: ReleaseHandler::new(store.clone()),
            store,
            config,
        }
    }

    /// Sweep forever at the configured interval. Store outages are
    /// logged and retried on the next tick rather than terminating
    /// the loop.
    pub async fn run(self) {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_seconds));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(0) => {}
                Ok(reaped) => tracing::info!(reaped, "Lease sweep complete"),
                Err(e) => tracing::error!(error = %e, "Lease sweep failed"),
            }
        }
    }

    /// Release every lease whose heartbeat is missing or older than
    /// the grace period. Returns the number of leases reclaimed.
    pub async fn sweep_once(&self) -> Result<usize> {
        let now = unix_now();
        let mut reaped = 0;

        for channel_id in self.store.active_channels().await? {
            let stale = match self.store.lease_heartbeat(channel_id).await? {
                Some(ts) => now.saturating_sub(ts) > self.config.ttl_seconds,
                None => true,
            };
            if stale {
                tracing::warn!(channel_id = %channel_id, "Reaping abandoned lease");
                self.release.release(channel_id).await?;
                metrics::LEASES_REAPED_TOTAL.inc();
                reaped += 1;
            }
        }

        Ok(reaped)
    }
}
