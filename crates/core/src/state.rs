//! Shared bot state

use crate::cache::UsageCache;
use crate::mappings::RoleMappingStore;

/// Everything the bot remembers for the lifetime of the process
#[derive(Default)]
pub struct PorterState {
    pub cache: UsageCache,
    pub mappings: RoleMappingStore,
}

impl PorterState {
    pub fn new() -> Self {
        Self::default()
    }
}
