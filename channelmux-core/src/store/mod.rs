//! Shared lease store abstraction
//!
//! Every process treats the store as the single source of truth; no
//! authoritative assignment state lives in local memory. The trait is
//! deliberately narrow: plain reads, the reservation writes, and the
//! two counter mutations that must be atomic on the store side.

pub mod keys;
pub mod memory;
pub mod redis;

pub use keys::KeyBuilder;
pub use memory::MemoryLeaseStore;
pub use redis::RedisLeaseStore;

use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{ChannelId, ProfileId, StreamId, StreamRef};
use crate::Result;

/// Current unix time in seconds, used for lease heartbeats.
#[must_use]
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Active lease of a channel, if any.
    async fn channel_stream(&self, channel_id: ChannelId) -> Result<Option<StreamRef>>;

    /// Write a channel's lease. Also stamps the lease heartbeat and
    /// adds the channel to the active-lease index.
    async fn set_channel_stream(&self, channel_id: ChannelId, stream: &StreamRef) -> Result<()>;

    /// Delete a channel's lease, its heartbeat, and its index entry.
    /// A no-op when none of them exist.
    async fn delete_channel_stream(&self, channel_id: ChannelId) -> Result<()>;

    /// Profile chosen for a leased stream, if any.
    async fn stream_profile(&self, stream_id: StreamId) -> Result<Option<ProfileId>>;

    async fn set_stream_profile(&self, stream_id: StreamId, profile_id: ProfileId) -> Result<()>;

    /// No-op when the association is already gone.
    async fn delete_stream_profile(&self, stream_id: StreamId) -> Result<()>;

    /// Current live connection count of a profile (0 when the key is
    /// absent). Read-only; exposed for capacity introspection.
    async fn connection_count(&self, profile_id: ProfileId) -> Result<u32>;

    /// Atomically increment the profile's live counter if it is below
    /// `max_connections`. Returns whether the slot was reserved.
    ///
    /// The check and the increment execute as one store-side step, so
    /// concurrent acquirers of the same profile can never overshoot
    /// the cap. Callers must not invoke this for unlimited profiles
    /// (`max_connections == 0`); those are admitted without counting.
    async fn try_reserve_slot(&self, profile_id: ProfileId, max_connections: u32) -> Result<bool>;

    /// Decrement the profile's live counter, flooring at zero. A no-op
    /// when the counter is absent or already zero.
    async fn release_slot(&self, profile_id: ProfileId) -> Result<()>;

    /// Refresh a lease's heartbeat. Returns false (without writing)
    /// when the channel holds no lease.
    async fn touch_lease(&self, channel_id: ChannelId) -> Result<bool>;

    /// Last heartbeat of a channel's lease, in unix seconds.
    async fn lease_heartbeat(&self, channel_id: ChannelId) -> Result<Option<u64>>;

    /// Channels currently in the active-lease index. Order is
    /// unspecified.
    async fn active_channels(&self) -> Result<Vec<ChannelId>>;
}
