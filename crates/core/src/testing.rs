//! In-memory platform double for tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::{
    ChannelId, CommunityId, CreatedInvite, InviteOptions, InviteRecord, MemberId, Role, RoleId,
};
use crate::platform::{InviteCreator, InviteSource, RoleDirectory, RoleGranter};

/// A role grant the fake recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantCall {
    pub community: CommunityId,
    pub member: MemberId,
    pub role: RoleId,
    pub reason: String,
}

#[derive(Default)]
struct Inner {
    invites: HashMap<CommunityId, Vec<InviteRecord>>,
    roles: HashMap<CommunityId, Vec<Role>>,
    deny_listing: Vec<CommunityId>,
    deny_grants: Vec<CommunityId>,
    missing_on_grant: Vec<CommunityId>,
    queued_listings: HashMap<CommunityId, VecDeque<(Vec<InviteRecord>, usize)>>,
    grants: Vec<GrantCall>,
    created: Vec<(ChannelId, InviteOptions)>,
    next_code: u32,
}

/// Scriptable platform: set invites and roles, flip permission failures,
/// and inspect the grants that were made
#[derive(Default)]
pub struct FakePlatform {
    inner: Mutex<Inner>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_invites(&self, community: CommunityId, invites: &[(&str, u64)]) {
        self.inner().invites.insert(
            community,
            invites
                .iter()
                .map(|(code, uses)| InviteRecord::new(*code, *uses))
                .collect(),
        );
    }

    /// Bump one invite's use count, as the platform does when someone joins
    pub fn use_invite(&self, community: CommunityId, code: &str) {
        let mut inner = self.inner();
        let invites = inner.invites.entry(community).or_default();
        match invites.iter_mut().find(|i| i.code == code) {
            Some(invite) => invite.uses += 1,
            None => invites.push(InviteRecord::new(code, 1)),
        }
    }

    pub fn set_roles(&self, community: CommunityId, roles: &[(u64, &str)]) {
        self.inner().roles.insert(
            community,
            roles
                .iter()
                .map(|(id, name)| Role::new(RoleId(*id), *name))
                .collect(),
        );
    }

    pub fn deny_listing(&self, community: CommunityId, deny: bool) {
        let mut inner = self.inner();
        inner.deny_listing.retain(|c| *c != community);
        if deny {
            inner.deny_listing.push(community);
        }
    }

    pub fn deny_grants(&self, community: CommunityId, deny: bool) {
        let mut inner = self.inner();
        inner.deny_grants.retain(|c| *c != community);
        if deny {
            inner.deny_grants.push(community);
        }
    }

    /// Grants fail with `RoleNotFound`, as when the role is deleted between
    /// lookup and grant
    pub fn lose_roles_on_grant(&self, community: CommunityId, lose: bool) {
        let mut inner = self.inner();
        inner.missing_on_grant.retain(|c| *c != community);
        if lose {
            inner.missing_on_grant.push(community);
        }
    }

    /// Queue a one-shot listing. Queued listings are served in order before
    /// the regular invites, each after yielding to the scheduler `yields` times.
    pub fn queue_listing(&self, community: CommunityId, invites: &[(&str, u64)], yields: usize) {
        let listing = invites
            .iter()
            .map(|(code, uses)| InviteRecord::new(*code, *uses))
            .collect();
        self.inner()
            .queued_listings
            .entry(community)
            .or_default()
            .push_back((listing, yields));
    }

    pub fn grants(&self) -> Vec<GrantCall> {
        self.inner().grants.clone()
    }

    pub fn created_invites(&self) -> Vec<(ChannelId, InviteOptions)> {
        self.inner().created.clone()
    }
}

#[async_trait]
impl InviteSource for FakePlatform {
    async fn list_invites(&self, community: CommunityId) -> Result<Vec<InviteRecord>> {
        let queued = {
            let mut inner = self.inner();
            if inner.deny_listing.contains(&community) {
                return Err(Error::PermissionDenied("Missing Manage Server".into()));
            }
            match inner
                .queued_listings
                .get_mut(&community)
                .and_then(|q| q.pop_front())
            {
                Some(entry) => entry,
                None => return Ok(inner.invites.get(&community).cloned().unwrap_or_default()),
            }
        };

        let (listing, yields) = queued;
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
        Ok(listing)
    }
}

#[async_trait]
impl RoleDirectory for FakePlatform {
    async fn roles(&self, community: CommunityId) -> Result<Vec<Role>> {
        Ok(self.inner().roles.get(&community).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl RoleGranter for FakePlatform {
    async fn add_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        let mut inner = self.inner();
        if inner.deny_grants.contains(&community) {
            return Err(Error::PermissionDenied("Missing Manage Roles".into()));
        }
        if inner.missing_on_grant.contains(&community) {
            return Err(Error::RoleNotFound(role));
        }
        inner.grants.push(GrantCall {
            community,
            member,
            role,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl InviteCreator for FakePlatform {
    async fn create_invite(
        &self,
        channel: ChannelId,
        options: InviteOptions,
    ) -> Result<CreatedInvite> {
        let mut inner = self.inner();
        inner.next_code += 1;
        let code = format!("fake{}", inner.next_code);
        inner.created.push((channel, options));
        Ok(CreatedInvite {
            url: format!("https://discord.gg/{}", code),
            code,
        })
    }
}
