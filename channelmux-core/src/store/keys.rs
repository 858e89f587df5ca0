//! Unified lease-store key builder
//!
//! All keys carry a configurable prefix so several environments can
//! share one Redis instance. Derived associations are keyed by the
//! stable stream id, never by the stream URL.

use crate::config::RedisConfig;
use crate::models::{ChannelId, ProfileId, StreamId};

#[derive(Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &RedisConfig) -> Self {
        Self::new(config.key_prefix.clone())
    }

    /// Active lease of a channel
    ///
    /// Type: String, serialized `StreamRef`
    #[must_use]
    pub fn channel_stream(&self, channel_id: ChannelId) -> String {
        format!("{}:channel_stream:{}", self.prefix, channel_id)
    }

    /// Profile chosen for a leased stream
    ///
    /// Type: String, profile id
    #[must_use]
    pub fn stream_profile(&self, stream_id: StreamId) -> String {
        format!("{}:stream_profile:{}", self.prefix, stream_id)
    }

    /// Live connection counter of a profile
    ///
    /// Type: String, integer; mutated only through the conditional
    /// increment and the floored decrement
    #[must_use]
    pub fn profile_connections(&self, profile_id: ProfileId) -> String {
        format!("{}:profile_connections:{}", self.prefix, profile_id)
    }

    /// Last renewal time of a channel's lease
    ///
    /// Type: String, unix seconds
    #[must_use]
    pub fn lease_heartbeat(&self, channel_id: ChannelId) -> String {
        format!("{}:lease_heartbeat:{}", self.prefix, channel_id)
    }

    /// Index of channels holding a lease, consumed by the reaper
    ///
    /// Type: Set of channel ids
    #[must_use]
    pub fn active_leases(&self) -> String {
        format!("{}:leases:active", self.prefix)
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new("channelmux")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builder_default_prefix() {
        let builder = KeyBuilder::default();

        assert_eq!(
            builder.channel_stream(ChannelId(12)),
            "channelmux:channel_stream:12"
        );
        assert_eq!(
            builder.stream_profile(StreamId(7)),
            "channelmux:stream_profile:7"
        );
        assert_eq!(
            builder.profile_connections(ProfileId(3)),
            "channelmux:profile_connections:3"
        );
        assert_eq!(
            builder.lease_heartbeat(ChannelId(12)),
            "channelmux:lease_heartbeat:12"
        );
        assert_eq!(builder.active_leases(), "channelmux:leases:active");
    }

    #[test]
    fn test_key_builder_custom_prefix() {
        let builder = KeyBuilder::new("prod");

        assert_eq!(
            builder.channel_stream(ChannelId(1)),
            "prod:channel_stream:1"
        );
        assert_eq!(builder.active_leases(), "prod:leases:active");
    }
}
