use serde::{Deserialize, Serialize};

use super::{ProfileId, StreamRef};

/// What a successful admission hands to the transport layer: the
/// chosen backing stream and the profile whose slot it occupies.
///
/// Repeat acquires of an already-assigned channel return the identical
/// grant; the upstream connection is shared by all viewers of the
/// channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseGrant {
    pub stream: StreamRef,
    pub profile_id: ProfileId,
}
