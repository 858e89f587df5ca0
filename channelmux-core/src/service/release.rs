//! Release handler
//!
//! Unwinds a channel's reservation when its viewing session ends.
//! Safe to call any number of times: every step degrades to a no-op
//! when the state it targets is already gone, since release may race
//! with, or follow, the reaper's cleanup of the same lease.

use std::sync::Arc;

use crate::metrics;
use crate::models::ChannelId;
use crate::store::LeaseStore;
use crate::Result;

pub struct ReleaseHandler {
    store: Arc<dyn LeaseStore>,
}

impl ReleaseHandler {
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    pub async fn release(&self, channel_id: ChannelId) -> Result<()> {
        metrics::RELEASES_TOTAL.inc();

        let Some(stream) = self.store.channel_stream(channel_id).await? else {
            // Clears heartbeat/index residue from a partial teardown.
            self.store.delete_channel_stream(channel_id).await?;
            tracing::debug!(channel_id = %channel_id, "Release with no active lease");
            return Ok(());
        };

        self.store.delete_channel_stream(channel_id).await?;

        if let Some(profile_id) = self.store.stream_profile(stream.id).await? {
            self.store.release_slot(profile_id).await?;
            self.store.delete_stream_profile(stream.id).await?;
            tracing::info!(
                channel_id = %channel_id,
                stream_id = %stream.id,
                profile_id = %profile_id,
                "Lease released"
            );
        } else {
            tracing::debug!(
                channel_id = %channel_id,
                stream_id = %stream.id,
                "Lease released with no profile association"
            );
        }

        Ok(())
    }
}
