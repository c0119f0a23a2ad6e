//! Invite tracker - reacts to community and member lifecycle events
//!
//! Join flow: lock the community's cache entry, fetch a fresh invite
//! listing, attribute, release the lock, then grant the mapped role.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionEngine, AttributionStrategy, FirstIncrease};
use crate::grant::{grant_role, GrantOutcome};
use crate::models::{CommunityId, Member, RoleId};
use crate::platform::Platform;
use crate::state::PorterState;

/// A community the bot has become aware of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityInfo {
    pub id: CommunityId,
    pub name: String,
}

/// Result of processing one member join
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The invite listing could not be fetched; cache left untouched
    SnapshotUnavailable,
    /// No invite's use count went up
    Unattributed,
    /// The used invite has no role mapped to it
    Unmapped { code: String },
    Granted { code: String, role: RoleId },
    GrantFailed { code: String, outcome: GrantOutcome },
}

/// Drives the attribution engine from platform events
pub struct InviteTracker<P: ?Sized, S = FirstIncrease> {
    platform: Arc<P>,
    engine: AttributionEngine<S>,
}

impl<P: Platform + ?Sized> InviteTracker<P, FirstIncrease> {
    pub fn new(platform: Arc<P>, state: Arc<PorterState>) -> Self {
        Self {
            platform,
            engine: AttributionEngine::new(state),
        }
    }
}

impl<P: Platform + ?Sized, S: AttributionStrategy> InviteTracker<P, S> {
    pub fn with_engine(platform: Arc<P>, engine: AttributionEngine<S>) -> Self {
        Self { platform, engine }
    }

    pub fn state(&self) -> &Arc<PorterState> {
        self.engine.state()
    }

    /// Seed the usage cache for a community; returns false if the listing
    /// could not be fetched and the community stays uncached
    pub async fn on_community_ready(&self, community: &CommunityInfo) -> bool {
        let mut guard = self.state().cache.lock(community.id).await;
        match self.platform.list_invites(community.id).await {
            Ok(invites) => {
                guard.replace(&invites);
                tracing::debug!(
                    community = %community.id,
                    invites = invites.len(),
                    "Cached invite usage"
                );
                true
            }
            Err(e) if e.is_permission_denied() => {
                tracing::warn!(
                    community = %community.name,
                    "Missing permissions to view invites"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    community = %community.name,
                    error = %e,
                    "Failed to fetch invites"
                );
                false
            }
        }
    }

    /// Seed every community the bot is in at startup
    pub async fn on_ready(&self, communities: &[CommunityInfo]) -> usize {
        let mut cached = 0;
        for community in communities {
            if self.on_community_ready(community).await {
                cached += 1;
            }
        }
        tracing::info!(communities = cached, "Cached invite usage for {} community(ies)", cached);
        cached
    }

    /// The bot was removed from a community
    pub fn on_community_removed(&self, community: CommunityId) {
        self.state().cache.forget(community);
        tracing::debug!(community = %community, "Forgot invite usage");
    }

    /// Attribute a join and grant the mapped role
    pub async fn on_member_join(&self, community: &CommunityInfo, member: &Member) -> JoinOutcome {
        let attribution = {
            let mut guard = self.state().cache.lock(community.id).await;
            let invites = match self.platform.list_invites(community.id).await {
                Ok(invites) => invites,
                Err(e) => {
                    if e.is_permission_denied() {
                        tracing::warn!(
                            community = %community.name,
                            "Missing permissions to view invites"
                        );
                    } else {
                        tracing::warn!(
                            community = %community.name,
                            error = %e,
                            "Failed to fetch invites"
                        );
                    }
                    return JoinOutcome::SnapshotUnavailable;
                }
            };
            self.engine.attribute_locked(&mut guard, &invites)
        };

        let Some(attribution) = attribution else {
            return JoinOutcome::Unattributed;
        };
        let Some(role) = attribution.grant() else {
            return JoinOutcome::Unmapped {
                code: attribution.code,
            };
        };

        match grant_role(&*self.platform, community.id, member, role, &attribution.code).await {
            GrantOutcome::Granted(role) => JoinOutcome::Granted {
                code: attribution.code,
                role: role.id,
            },
            outcome => JoinOutcome::GrantFailed {
                code: attribution.code,
                outcome,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::UsageSnapshot;
    use crate::models::{InviteRecord, MemberId};
    use crate::testing::FakePlatform;

    fn guild() -> CommunityInfo {
        CommunityInfo {
            id: CommunityId(1),
            name: "Test Guild".into(),
        }
    }

    fn setup() -> (Arc<FakePlatform>, InviteTracker<FakePlatform>) {
        let platform = Arc::new(FakePlatform::new());
        let tracker = InviteTracker::new(platform.clone(), Arc::new(PorterState::new()));
        (platform, tracker)
    }

    fn bob() -> Member {
        Member::new(MemberId(2), "bob")
    }

    #[tokio::test]
    async fn test_join_grants_mapped_role() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("X", 0), ("Y", 2)]);
        platform.set_roles(g.id, &[(50, "Visitor")]);
        tracker.on_ready(std::slice::from_ref(&g)).await;
        tracker.state().mappings.create(g.id, "Y", RoleId(50));

        platform.use_invite(g.id, "Y");
        let outcome = tracker.on_member_join(&g, &bob()).await;

        assert_eq!(
            outcome,
            JoinOutcome::Granted {
                code: "Y".into(),
                role: RoleId(50)
            }
        );
        assert_eq!(platform.grants()[0].member, MemberId(2));
    }

    #[tokio::test]
    async fn test_unmapped_invite() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("X", 0)]);
        tracker.on_community_ready(&g).await;

        platform.use_invite(g.id, "X");
        let outcome = tracker.on_member_join(&g, &bob()).await;
        assert_eq!(outcome, JoinOutcome::Unmapped { code: "X".into() });
        assert!(platform.grants().is_empty());
    }

    #[tokio::test]
    async fn test_join_without_invite() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("X", 4)]);
        tracker.on_community_ready(&g).await;

        assert_eq!(tracker.on_member_join(&g, &bob()).await, JoinOutcome::Unattributed);
    }

    #[tokio::test]
    async fn test_listing_denied_leaves_state_untouched() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("X", 1)]);
        tracker.on_community_ready(&g).await;
        tracker.state().mappings.create(g.id, "X", RoleId(9));

        platform.use_invite(g.id, "X");
        platform.deny_listing(g.id, true);
        let outcome = tracker.on_member_join(&g, &bob()).await;

        assert_eq!(outcome, JoinOutcome::SnapshotUnavailable);
        assert_eq!(
            tracker.state().cache.snapshot(g.id).await,
            Some(UsageSnapshot::from_records(&[InviteRecord::new("X", 1)]))
        );
        assert_eq!(tracker.state().mappings.len(), 1);
        assert!(platform.grants().is_empty());
    }

    #[tokio::test]
    async fn test_ready_without_permission_skips_community() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("X", 3)]);
        platform.deny_listing(g.id, true);

        assert_eq!(tracker.on_ready(std::slice::from_ref(&g)).await, 0);
        assert!(tracker.state().cache.snapshot(g.id).await.is_none());

        // Uncached community: any invite with uses looks consumed
        platform.deny_listing(g.id, false);
        let outcome = tracker.on_member_join(&g, &bob()).await;
        assert_eq!(outcome, JoinOutcome::Unmapped { code: "X".into() });
    }

    #[tokio::test]
    async fn test_deleted_role_reported() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("X", 0)]);
        tracker.on_community_ready(&g).await;
        tracker.state().mappings.create(g.id, "X", RoleId(404));

        platform.use_invite(g.id, "X");
        let outcome = tracker.on_member_join(&g, &bob()).await;
        assert_eq!(
            outcome,
            JoinOutcome::GrantFailed {
                code: "X".into(),
                outcome: GrantOutcome::RoleMissing(RoleId(404))
            }
        );
    }

    #[tokio::test]
    async fn test_repeated_uses_of_same_invite() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("A", 0)]);
        tracker.on_community_ready(&g).await;

        platform.use_invite(g.id, "A");
        let first = tracker.on_member_join(&g, &bob()).await;
        platform.use_invite(g.id, "A");
        let second = tracker.on_member_join(&g, &bob()).await;

        assert_eq!(first, JoinOutcome::Unmapped { code: "A".into() });
        assert_eq!(second, JoinOutcome::Unmapped { code: "A".into() });
    }

    #[tokio::test]
    async fn test_community_removed_forgets_cache() {
        let (platform, tracker) = setup();
        let g = guild();
        platform.set_invites(g.id, &[("X", 0)]);
        tracker.on_community_ready(&g).await;

        tracker.on_community_removed(g.id);
        assert!(tracker.state().cache.snapshot(g.id).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_joins_serialize_across_fetch() {
        let (platform, tracker) = setup();
        let tracker = Arc::new(tracker);
        let g = guild();
        platform.set_invites(g.id, &[("A", 0), ("B", 0)]);
        tracker.on_community_ready(&g).await;

        // The first fetch is slow and sees only A used; the second sees both
        platform.queue_listing(g.id, &[("A", 1), ("B", 0)], 8);
        platform.queue_listing(g.id, &[("A", 1), ("B", 1)], 0);

        let first = {
            let (tracker, g) = (tracker.clone(), g.clone());
            tokio::spawn(async move {
                tracker
                    .on_member_join(&g, &Member::new(MemberId(3), "carol"))
                    .await
            })
        };
        let second = {
            let (tracker, g) = (tracker.clone(), g.clone());
            tokio::spawn(async move {
                tracker
                    .on_member_join(&g, &Member::new(MemberId(4), "dave"))
                    .await
            })
        };

        assert_eq!(first.await.unwrap(), JoinOutcome::Unmapped { code: "A".into() });
        assert_eq!(second.await.unwrap(), JoinOutcome::Unmapped { code: "B".into() });
        assert_eq!(
            tracker.state().cache.snapshot(g.id).await,
            Some(UsageSnapshot::from_records(&[
                InviteRecord::new("A", 1),
                InviteRecord::new("B", 1)
            ]))
        );
    }
}
