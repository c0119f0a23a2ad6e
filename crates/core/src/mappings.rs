//! Role mapping store - which role an invite grants
//!
//! Keyed by (community, invite code). Entries are only removed in bulk;
//! a mapping for an invite that has since expired just never matches again.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{CommunityId, RoleId, RoleMapping};

/// Process-wide invite-to-role mappings, listed in insertion order
#[derive(Debug, Default)]
pub struct RoleMappingStore {
    entries: RwLock<Vec<RoleMapping>>,
}

impl RoleMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<RoleMapping>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Mapping store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<RoleMapping>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Mapping store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Map an invite code to a role, replacing any earlier mapping
    ///
    /// An overwritten entry keeps its original position in the listing.
    pub fn create(&self, community: CommunityId, code: impl Into<String>, role: RoleId) {
        let code = code.into();
        let mut entries = self.write();
        match entries
            .iter_mut()
            .find(|m| m.community == community && m.code == code)
        {
            Some(existing) => existing.role = role,
            None => entries.push(RoleMapping {
                community,
                code,
                role,
            }),
        }
    }

    /// Role mapped to an invite code, if any
    pub fn role_for(&self, community: CommunityId, code: &str) -> Option<RoleId> {
        self.read()
            .iter()
            .find(|m| m.community == community && m.code == code)
            .map(|m| m.role)
    }

    /// Mappings made in one community
    pub fn list(&self, community: CommunityId) -> Vec<RoleMapping> {
        self.read()
            .iter()
            .filter(|m| m.community == community)
            .cloned()
            .collect()
    }

    /// Every mapping across all communities
    pub fn list_all(&self) -> Vec<RoleMapping> {
        self.read().clone()
    }

    /// Remove every mapping in every community. Commands use `clear_community`.
    pub fn clear_all(&self) {
        self.write().clear();
    }

    /// Remove one community's mappings, returning how many were dropped
    pub fn clear_community(&self, community: CommunityId) -> usize {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|m| m.community != community);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
