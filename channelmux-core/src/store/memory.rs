//! In-process lease store
//!
//! A mutex-guarded fake with the same semantics as the Redis store,
//! used by tests and by single-node embedders. Every trait method
//! takes the lock once, so the conditional increment is atomic here
//! the same way the Lua script is on Redis.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

use super::{unix_now, LeaseStore};
use crate::models::{ChannelId, ProfileId, StreamId, StreamRef};
use crate::Result;

#[derive(Debug, Default)]
struct Inner {
    channel_streams: HashMap<ChannelId, StreamRef>,
    stream_profiles: HashMap<StreamId, ProfileId>,
    connections: HashMap<ProfileId, u32>,
    heartbeats: HashMap<ChannelId, u64>,
    active: BTreeSet<ChannelId>,
}

#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    inner: Mutex<Inner>,
}

impl MemoryLeaseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn set_heartbeat(&self, channel_id: ChannelId, unix_seconds: u64) {
        self.inner.lock().heartbeats.insert(channel_id, unix_seconds);
    }

    #[cfg(test)]
    pub(crate) fn clear_heartbeat(&self, channel_id: ChannelId) {
        self.inner.lock().heartbeats.remove(&channel_id);
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn channel_stream(&self, channel_id: ChannelId) -> Result<Option<StreamRef>> {
        Ok(self.inner.lock().channel_streams.get(&channel_id).cloned())
    }

    async fn set_channel_stream(&self, channel_id: ChannelId, stream: &StreamRef) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.channel_streams.insert(channel_id, stream.clone());
        inner.heartbeats.insert(channel_id, unix_now());
        inner.active.insert(channel_id);
        Ok(())
    }

    async fn delete_channel_stream(&self, channel_id: ChannelId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.channel_streams.remove(&channel_id);
        inner.heartbeats.remove(&channel_id);
        inner.active.remove(&channel_id);
        Ok(())
    }

    async fn stream_profile(&self, stream_id: StreamId) -> Result<Option<ProfileId>> {
        Ok(self.inner.lock().stream_profiles.get(&stream_id).copied())
    }

    async fn set_stream_profile(&self, stream_id: StreamId, profile_id: ProfileId) -> Result<()> {
        self.inner.lock().stream_profiles.insert(stream_id, profile_id);
        Ok(())
    }

    async fn delete_stream_profile(&self, stream_id: StreamId) -> Result<()> {
        self.inner.lock().stream_profiles.remove(&stream_id);
        Ok(())
    }

    async fn connection_count(&self, profile_id: ProfileId) -> Result<u32> {
        Ok(self
            .inner
            .lock()
            .connections
            .get(&profile_id)
            .copied()
            .unwrap_or(0))
    }

    async fn try_reserve_slot(&self, profile_id: ProfileId, max_connections: u32) -> Result<bool> {
        let mut inner = self.inner.lock();
        let count = inner.connections.entry(profile_id).or_insert(0);
        if *count < max_connections {
            *count += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn release_slot(&self, profile_id: ProfileId) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.connections.get_mut(&profile_id) {
            if *count > 0 {
                *count -= 1;
            }
        }
        Ok(())
    }

    async fn touch_lease(&self, channel_id: ChannelId) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.channel_streams.contains_key(&channel_id) {
            inner.heartbeats.insert(channel_id, unix_now());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn lease_heartbeat(&self, channel_id: ChannelId) -> Result<Option<u64>> {
        Ok(self.inner.lock().heartbeats.get(&channel_id).copied())
    }

    async fn active_channels(&self) -> Result<Vec<ChannelId>> {
        Ok(self.inner.lock().active.iter().copied().collect())
    }
}
