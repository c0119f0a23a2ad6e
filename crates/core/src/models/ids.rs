//! Platform identifiers
//!
//! The chat platform hands out 64-bit snowflakes. Each kind gets its own
//! newtype so a role id can never be passed where a community id is expected.

use serde::{Deserialize, Serialize};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// A community (server/guild)
    CommunityId
);
snowflake!(
    /// A member of a community
    MemberId
);
snowflake!(
    /// A role defined in a community
    RoleId
);
snowflake!(
    /// A text channel invites are created in
    ChannelId
);
