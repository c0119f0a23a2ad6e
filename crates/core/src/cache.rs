//! Usage cache - last observed invite use counts per community
//!
//! Each community's entry sits behind its own async mutex. A join holds that
//! lock across the whole fetch, diff and replace cycle so two joins in the
//! same community can never interleave their snapshots. Communities never
//! contend with each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::{CommunityId, InviteRecord};

/// `code -> uses` projection of one invite listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageSnapshot {
    uses: HashMap<String, u64>,
}

impl UsageSnapshot {
    pub fn from_records(records: &[InviteRecord]) -> Self {
        Self {
            uses: records
                .iter()
                .map(|r| (r.code.clone(), r.uses))
                .collect(),
        }
    }

    /// Last known use count for a code
    pub fn get(&self, code: &str) -> Option<u64> {
        self.uses.get(code).copied()
    }

    pub fn len(&self) -> usize {
        self.uses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uses.is_empty()
    }
}

type Slot = Arc<AsyncMutex<Option<UsageSnapshot>>>;

/// Exclusive access to one community's cached snapshot
pub struct UsageGuard {
    community: CommunityId,
    slot: OwnedMutexGuard<Option<UsageSnapshot>>,
}

impl UsageGuard {
    pub fn community(&self) -> CommunityId {
        self.community
    }

    /// The cached snapshot, or None if the community was never initialized
    pub fn previous(&self) -> Option<&UsageSnapshot> {
        self.slot.as_ref()
    }

    /// Replace the cached snapshot wholesale
    pub fn replace(&mut self, records: &[InviteRecord]) {
        *self.slot = Some(UsageSnapshot::from_records(records));
    }
}

/// Per-community invite usage cache
#[derive(Default)]
pub struct UsageCache {
    slots: Mutex<HashMap<CommunityId, Slot>>,
}

impl UsageCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, community: CommunityId) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Usage cache mutex poisoned, recovering");
                poisoned.into_inner()
            }
        };
        slots.entry(community).or_default().clone()
    }

    /// Lock a community's entry, waiting for any in-flight join to finish
    pub async fn lock(&self, community: CommunityId) -> UsageGuard {
        let slot = self.slot(community).lock_owned().await;
        UsageGuard { community, slot }
    }

    /// Seed a community from a bulk listing
    ///
    /// Unconditional replace, so repeating it with the same listing is a no-op.
    pub async fn initialize(&self, community: CommunityId, records: &[InviteRecord]) {
        let mut guard = self.lock(community).await;
        guard.replace(records);
        tracing::debug!(
            community = %community,
            invites = records.len(),
            "Initialized invite usage"
        );
    }

    /// Copy of a community's cached snapshot
    pub async fn snapshot(&self, community: CommunityId) -> Option<UsageSnapshot> {
        self.lock(community).await.previous().cloned()
    }

    /// Number of communities with a cached snapshot
    pub async fn tracked_communities(&self) -> usize {
        let slots: Vec<Slot> = match self.slots.lock() {
            Ok(guard) => guard.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };

        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Drop a community entirely (e.g. the bot was removed from it)
    pub fn forget(&self, community: CommunityId) {
        let mut slots = match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.remove(&community);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(pairs: &[(&str, u64)]) -> Vec<InviteRecord> {
        pairs.iter().map(|(c, u)| InviteRecord::new(*c, *u)).collect()
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let cache = UsageCache::new();
        let community = CommunityId(1);
        let listing = records(&[("a", 1), ("b", 2)]);

        cache.initialize(community, &listing).await;
        let once = cache.snapshot(community).await;
        cache.initialize(community, &listing).await;
        let twice = cache.snapshot(community).await;

        assert_eq!(once, twice);
        assert_eq!(twice.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_drops_deleted_invites() {
        let cache = UsageCache::new();
        let community = CommunityId(1);
        cache.initialize(community, &records(&[("old", 4)])).await;

        {
            let mut guard = cache.lock(community).await;
            guard.replace(&records(&[("new", 1)]));
        }

        let snapshot = cache.snapshot(community).await.unwrap();
        assert_eq!(snapshot.get("old"), None);
        assert_eq!(snapshot.get("new"), Some(1));
    }

    #[tokio::test]
    async fn test_absent_community() {
        let cache = UsageCache::new();
        assert!(cache.snapshot(CommunityId(9)).await.is_none());
        assert_eq!(cache.tracked_communities().await, 0);
    }

    #[tokio::test]
    async fn test_forget() {
        let cache = UsageCache::new();
        cache.initialize(CommunityId(1), &records(&[("a", 1)])).await;
        cache.initialize(CommunityId(2), &records(&[])).await;
        assert_eq!(cache.tracked_communities().await, 2);

        cache.forget(CommunityId(1));
        assert_eq!(cache.tracked_communities().await, 1);
        assert!(cache.snapshot(CommunityId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_lock_serializes_same_community() {
        let cache = Arc::new(UsageCache::new());
        let community = CommunityId(5);
        let guard = cache.lock(community).await;

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                let mut g = cache.lock(community).await;
                g.replace(&[InviteRecord::new("late", 1)]);
            })
        };

        // Other communities are not blocked
        cache.initialize(CommunityId(6), &[]).await;

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();

        assert_eq!(cache.snapshot(community).await.unwrap().get("late"), Some(1));
    }
}
