pub mod id;
pub mod lease;
pub mod stream;

pub use id::{AccountId, ChannelId, ProfileId, StreamId};
pub use lease::LeaseGrant;
pub use stream::{Candidate, Profile, Stream, StreamRef};
