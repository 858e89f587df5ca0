//! Read-only view of a channel's candidate streams
//!
//! The catalog is externally owned (database, API, flat file); the
//! admission core only ever reads it. Candidate order is authoritative
//! and ascending; the first admissible pair wins.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{Candidate, ChannelId};
use crate::Result;

#[async_trait]
pub trait Catalog: Send + Sync {
    /// The ordered candidate list for a channel. An unknown channel
    /// yields an empty list, which the admission path reports as
    /// `NoCapacity`.
    async fn candidates(&self, channel_id: ChannelId) -> Result<Vec<Candidate>>;
}

/// Fixed in-memory catalog for tests and embedders that already hold
/// the candidate lists.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    channels: HashMap<ChannelId, Vec<Candidate>>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_channel(mut self, channel_id: ChannelId, candidates: Vec<Candidate>) -> Self {
        self.channels.insert(channel_id, candidates);
        self
    }

    pub fn insert(&mut self, channel_id: ChannelId, candidates: Vec<Candidate>) {
        self.channels.insert(channel_id, candidates);
    }
}

#[async_trait]
impl Catalog for StaticCatalog {
    async fn candidates(&self, channel_id: ChannelId) -> Result<Vec<Candidate>> {
        Ok(self.channels.get(&channel_id).cloned().unwrap_or_default())
    }
}
