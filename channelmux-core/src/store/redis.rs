//! Redis-backed lease store
//!
//! Uses a `ConnectionManager` for reconnection handling and Lua
//! scripts for the operations that must be atomic on the server:
//! the capacity-checked increment, the floored decrement, and the
//! lease-guarded heartbeat touch.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;

use super::{unix_now, KeyBuilder, LeaseStore};
use crate::config::RedisConfig;
use crate::models::{ChannelId, ProfileId, StreamId, StreamRef};
use crate::{Error, Result};

/// Read the counter, compare against the cap, and increment in one
/// server-side step. Returns 1 when the slot was reserved.
const TRY_RESERVE_SLOT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current < tonumber(ARGV[1]) then
    redis.call('INCR', KEYS[1])
    return 1
end
return 0
";

/// Decrement the counter only while it is above zero.
const RELEASE_SLOT: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current > 0 then
    redis.call('DECR', KEYS[1])
end
return current
";

/// Refresh the heartbeat only while the lease still exists, so a
/// racing release is not resurrected by a late renewal.
const TOUCH_LEASE: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('SET', KEYS[2], ARGV[1])
    return 1
end
return 0
";

#[derive(Clone)]
pub struct RedisLeaseStore {
    conn: ConnectionManager,
    keys: KeyBuilder,
}

impl RedisLeaseStore {
    #[must_use]
    pub fn new(conn: ConnectionManager, keys: KeyBuilder) -> Self {
        Self { conn, keys }
    }

    /// Connect to the lease store described by the configuration.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_seconds),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| {
            Error::Internal(format!(
                "Timed out connecting to lease store at {}",
                config.url
            ))
        })??;

        Ok(Self::new(conn, KeyBuilder::from_config(config)))
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn channel_stream(&self, channel_id: ChannelId) -> Result<Option<StreamRef>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.keys.channel_stream(channel_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_channel_stream(&self, channel_id: ChannelId, stream: &StreamRef) -> Result<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(stream)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(self.keys.channel_stream(channel_id), json)
            .ignore()
            .set(self.keys.lease_heartbeat(channel_id), unix_now())
            .ignore()
            .sadd(self.keys.active_leases(), channel_id.0)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_channel_stream(&self, channel_id: ChannelId) -> Result<()> {
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(self.keys.channel_stream(channel_id))
            .ignore()
            .del(self.keys.lease_heartbeat(channel_id))
            .ignore()
            .srem(self.keys.active_leases(), channel_id.0)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn stream_profile(&self, stream_id: StreamId) -> Result<Option<ProfileId>> {
        let mut conn = self.conn.clone();
        let raw: Option<u64> = conn.get(self.keys.stream_profile(stream_id)).await?;
        Ok(raw.map(ProfileId))
    }

    async fn set_stream_profile(&self, stream_id: StreamId, profile_id: ProfileId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(self.keys.stream_profile(stream_id), profile_id.0)
            .await?;
        Ok(())
    }

    async fn delete_stream_profile(&self, stream_id: StreamId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.keys.stream_profile(stream_id)).await?;
        Ok(())
    }

    async fn connection_count(&self, profile_id: ProfileId) -> Result<u32> {
        let mut conn = self.conn.clone();
        let count: Option<u32> = conn.get(self.keys.profile_connections(profile_id)).await?;
        Ok(count.unwrap_or(0))
    }

    async fn try_reserve_slot(&self, profile_id: ProfileId, max_connections: u32) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reserved: i32 = Script::new(TRY_RESERVE_SLOT)
            .key(self.keys.profile_connections(profile_id))
            .arg(max_connections)
            .invoke_async(&mut conn)
            .await?;
        Ok(reserved == 1)
    }

    async fn release_slot(&self, profile_id: ProfileId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i32 = Script::new(RELEASE_SLOT)
            .key(self.keys.profile_connections(profile_id))
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn touch_lease(&self, channel_id: ChannelId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let touched: i32 = Script::new(TOUCH_LEASE)
            .key(self.keys.channel_stream(channel_id))
            .key(self.keys.lease_heartbeat(channel_id))
            .arg(unix_now())
            .invoke_async(&mut conn)
            .await?;
        Ok(touched == 1)
    }

    async fn lease_heartbeat(&self, channel_id: ChannelId) -> Result<Option<u64>> {
        let mut conn = self.conn.clone();
        let ts: Option<u64> = conn.get(self.keys.lease_heartbeat(channel_id)).await?;
        Ok(ts)
    }

    async fn active_channels(&self) -> Result<Vec<ChannelId>> {
        let mut conn = self.conn.clone();
        let ids: Vec<u64> = conn.smembers(self.keys.active_leases()).await?;
        Ok(ids.into_iter().map(ChannelId).collect())
    }
}
