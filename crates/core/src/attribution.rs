//! Attribution engine - which invite did this join consume?
//!
//! Diffs a fresh invite listing against the cached one. The cache is always
//! replaced by the fresh listing, whether or not anything matched.

use std::sync::Arc;

use crate::cache::{UsageGuard, UsageSnapshot};
use crate::models::{Attribution, CommunityId, InviteRecord};
use crate::state::PorterState;

/// Picks the invite a join consumed from a fresh listing
pub trait AttributionStrategy: Send + Sync {
    /// `previous` is None when the community has never been cached
    fn select<'a>(
        &self,
        previous: Option<&UsageSnapshot>,
        fresh: &'a [InviteRecord],
    ) -> Option<&'a InviteRecord>;
}

/// First invite in listing order whose use count went up
///
/// Codes missing from the previous snapshot count from zero, so a brand-new
/// invite with any prior uses is selected. Two joins racing on different
/// invites are attributed to whichever invite the platform lists first.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstIncrease;

impl AttributionStrategy for FirstIncrease {
    fn select<'a>(
        &self,
        previous: Option<&UsageSnapshot>,
        fresh: &'a [InviteRecord],
    ) -> Option<&'a InviteRecord> {
        fresh.iter().find(|invite| {
            let before = previous.and_then(|p| p.get(&invite.code)).unwrap_or(0);
            invite.uses > before
        })
    }
}

/// Attribution engine over the shared state
pub struct AttributionEngine<S = FirstIncrease> {
    state: Arc<PorterState>,
    strategy: S,
}

impl AttributionEngine<FirstIncrease> {
    pub fn new(state: Arc<PorterState>) -> Self {
        Self::with_strategy(state, FirstIncrease)
    }
}

impl<S: AttributionStrategy> AttributionEngine<S> {
    pub fn with_strategy(state: Arc<PorterState>, strategy: S) -> Self {
        Self { state, strategy }
    }

    pub fn state(&self) -> &Arc<PorterState> {
        &self.state
    }

    /// Attribute a join given a listing fetched outside the community lock
    pub async fn attribute(
        &self,
        community: CommunityId,
        fresh: &[InviteRecord],
    ) -> Option<Attribution> {
        let mut guard = self.state.cache.lock(community).await;
        self.attribute_locked(&mut guard, fresh)
    }

    /// Attribute a join while already holding the community's cache lock
    pub fn attribute_locked(
        &self,
        guard: &mut UsageGuard,
        fresh: &[InviteRecord],
    ) -> Option<Attribution> {
        let community = guard.community();
        let used = self
            .strategy
            .select(guard.previous(), fresh)
            .map(|invite| invite.code.clone());

        guard.replace(fresh);

        let Some(code) = used else {
            tracing::debug!(community = %community, "No invite use count increased");
            return None;
        };

        let role = self.state.mappings.role_for(community, &code);
        tracing::debug!(
            community = %community,
            code = %code,
            role = ?role,
            "Attributed join to invite"
        );
        Some(Attribution { code, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleId;

    const G: CommunityId = CommunityId(10);

    fn records(pairs: &[(&str, u64)]) -> Vec<InviteRecord> {
        pairs.iter().map(|(c, u)| InviteRecord::new(*c, *u)).collect()
    }

    fn engine() -> AttributionEngine {
        AttributionEngine::new(Arc::new(PorterState::new()))
    }

    #[tokio::test]
    async fn test_empty_cache_first_join() {
        let engine = engine();
        engine.state().mappings.create(G, "X", RoleId(100));

        let result = engine.attribute(G, &records(&[("X", 1)])).await;

        assert_eq!(
            result,
            Some(Attribution {
                code: "X".into(),
                role: Some(RoleId(100))
            })
        );
        let cached = engine.state().cache.snapshot(G).await.unwrap();
        assert_eq!(cached, UsageSnapshot::from_records(&records(&[("X", 1)])));
    }

    #[tokio::test]
    async fn test_first_match_in_listing_order() {
        let engine = engine();
        engine
            .state()
            .cache
            .initialize(G, &records(&[("A", 1), ("B", 2)]))
            .await;

        let result = engine
            .attribute(G, &records(&[("A", 1), ("B", 3), ("C", 1)]))
            .await
            .unwrap();

        assert_eq!(result.code, "B");
        assert_eq!(result.role, None);
    }

    #[tokio::test]
    async fn test_new_invite_with_history_counts_as_used() {
        // Invites created elsewhere start from a zero baseline
        let engine = engine();
        engine.state().cache.initialize(G, &records(&[("X", 1)])).await;

        let result = engine
            .attribute(G, &records(&[("X", 1), ("Y", 4)]))
            .await
            .unwrap();

        assert_eq!(result.code, "Y");
    }

    #[tokio::test]
    async fn test_no_increase_no_match() {
        let engine = engine();
        let listing = records(&[("A", 3), ("B", 0)]);
        engine.state().cache.initialize(G, &listing).await;

        assert_eq!(engine.attribute(G, &listing).await, None);
        assert_eq!(
            engine.state().cache.snapshot(G).await.unwrap(),
            UsageSnapshot::from_records(&listing)
        );
    }

    #[tokio::test]
    async fn test_cache_replaced_without_merge() {
        let engine = engine();
        engine
            .state()
            .cache
            .initialize(G, &records(&[("gone", 9), ("kept", 1)]))
            .await;

        let fresh = records(&[("kept", 1), ("fresh", 0)]);
        assert_eq!(engine.attribute(G, &fresh).await, None);

        let cached = engine.state().cache.snapshot(G).await.unwrap();
        assert_eq!(cached, UsageSnapshot::from_records(&fresh));
        assert_eq!(cached.get("gone"), None);
    }

    #[tokio::test]
    async fn test_cleared_mappings_yield_no_role() {
        let engine = engine();
        engine.state().mappings.create(G, "X", RoleId(1));
        engine.state().mappings.clear_all();

        let result = engine.attribute(G, &records(&[("X", 1)])).await.unwrap();
        assert_eq!(result.grant(), None);
    }

    #[tokio::test]
    async fn test_zero_use_new_invite_not_matched() {
        let engine = engine();
        assert_eq!(engine.attribute(G, &records(&[("X", 0)])).await, None);
    }

    struct LastIncrease;

    impl AttributionStrategy for LastIncrease {
        fn select<'a>(
            &self,
            previous: Option<&UsageSnapshot>,
            fresh: &'a [InviteRecord],
        ) -> Option<&'a InviteRecord> {
            fresh
                .iter()
                .rev()
                .find(|i| i.uses > previous.and_then(|p| p.get(&i.code)).unwrap_or(0))
        }
    }

    #[tokio::test]
    async fn test_strategy_is_pluggable() {
        let engine = AttributionEngine::with_strategy(Arc::new(PorterState::new()), LastIncrease);
        let result = engine
            .attribute(G, &records(&[("A", 1), ("B", 1)]))
            .await
            .unwrap();
        assert_eq!(result.code, "B");
    }
}
