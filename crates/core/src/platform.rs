//! Chat platform collaborator traits
//!
//! These traits define what the bot needs from the platform, allowing for
//! different implementations (REST client, in-memory fake).

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    ChannelId, CommunityId, CreatedInvite, InviteOptions, InviteRecord, MemberId, Role, RoleId,
};

/// Source of invite listings
#[async_trait]
pub trait InviteSource: Send + Sync {
    /// Current invites of a community with their cumulative use counts,
    /// in the order the platform returns them
    async fn list_invites(&self, community: CommunityId) -> Result<Vec<InviteRecord>>;
}

/// Lookup of a community's roles
#[async_trait]
pub trait RoleDirectory: Send + Sync {
    async fn roles(&self, community: CommunityId) -> Result<Vec<Role>>;

    /// Find a single role by id
    async fn find_role(&self, community: CommunityId, role: RoleId) -> Result<Option<Role>> {
        Ok(self.roles(community).await?.into_iter().find(|r| r.id == role))
    }
}

/// Applies roles to members
#[async_trait]
pub trait RoleGranter: Send + Sync {
    async fn add_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
        reason: &str,
    ) -> Result<()>;
}

/// Creates invites
#[async_trait]
pub trait InviteCreator: Send + Sync {
    async fn create_invite(
        &self,
        channel: ChannelId,
        options: InviteOptions,
    ) -> Result<CreatedInvite>;
}

/// Combined platform interface
pub trait Platform: InviteSource + RoleDirectory + RoleGranter + InviteCreator {}

// Blanket implementation: any type implementing all traits implements Platform
impl<T> Platform for T where T: InviteSource + RoleDirectory + RoleGranter + InviteCreator {}
