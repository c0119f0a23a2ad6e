//! Invite snapshot and attribution models

use serde::{Deserialize, Serialize};

use super::{CommunityId, RoleId};

/// One entry of an invite listing: the code and its cumulative use count
///
/// Fetched fresh on every snapshot; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRecord {
    pub code: String,
    #[serde(default)]
    pub uses: u64,
}

impl InviteRecord {
    pub fn new(code: impl Into<String>, uses: u64) -> Self {
        Self {
            code: code.into(),
            uses,
        }
    }
}

/// Limits for a newly created invite. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteOptions {
    pub max_uses: u32,
    pub max_age_secs: u32,
}

impl InviteOptions {
    pub fn with_max_uses(mut self, max: u32) -> Self {
        self.max_uses = max;
        self
    }

    pub fn with_max_age(mut self, secs: u32) -> Self {
        self.max_age_secs = secs;
        self
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_uses == 0 && self.max_age_secs == 0
    }
}

/// An invite the platform just created for us
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedInvite {
    pub code: String,
    pub url: String,
}

/// Invite code to role association, scoped to the community it was made in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMapping {
    pub community: CommunityId,
    pub code: String,
    pub role: RoleId,
}

/// Which invite a join consumed, and the role mapped to it (if any)
///
/// A join with no matching invite is represented by `Option::None` at the
/// call site, not by this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub code: String,
    pub role: Option<RoleId>,
}

impl Attribution {
    /// The role to grant, if the matched invite is mapped
    pub fn grant(&self) -> Option<RoleId> {
        self.role
    }
}
