use serde::{Deserialize, Serialize};

use super::{AccountId, ProfileId, StreamId};

/// A backing media source belonging to exactly one upstream account.
///
/// The URL is what the transport layer ultimately connects to; every
/// store key derived from a stream uses its stable `id` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub url: String,
    pub account_id: AccountId,
}

impl Stream {
    /// The portable reference handed to the transport layer and stored
    /// as the lease value.
    #[must_use]
    pub fn to_ref(&self) -> StreamRef {
        StreamRef {
            id: self.id,
            url: self.url.clone(),
        }
    }
}

/// Stable stream reference: id for store keys, URL for the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRef {
    pub id: StreamId,
    pub url: String,
}

/// A connection slot type under an upstream account.
///
/// `max_connections == 0` means unlimited; such profiles are admitted
/// without touching the live counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub active: bool,
    pub is_default: bool,
    pub max_connections: u32,
}

/// One entry of a channel's ordered candidate list: a stream plus the
/// profiles of its owning account. The account carries no state of its
/// own here; it is reachable through `stream.account_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub stream: Stream,
    pub profiles: Vec<Profile>,
}
