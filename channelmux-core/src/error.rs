use thiserror::Error;

use crate::models::ChannelId;

#[derive(Error, Debug)]
pub enum Error {
    /// Every candidate stream/profile for the channel is inactive or
    /// saturated. Recoverable by the caller; never retried here.
    #[error("No capacity available for channel {0}")]
    NoCapacity(ChannelId),

    /// The shared lease store cannot be reached. Fatal to the current
    /// call; guessing state would risk the capacity invariant.
    #[error("Lease store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the recoverable "stream unavailable" outcome.
    #[must_use]
    pub const fn is_no_capacity(&self) -> bool {
        matches!(self, Self::NoCapacity(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
