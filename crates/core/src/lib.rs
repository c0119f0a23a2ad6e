//! Porter Core Library
//!
//! Invite attribution for community joins: the usage cache, the invite-role
//! mapping store, the attribution engine, and the command surface that
//! manages mappings.

pub mod attribution;
pub mod cache;
pub mod commands;
pub mod error;
pub mod grant;
pub mod mappings;
pub mod models;
pub mod permissions;
pub mod platform;
pub mod state;
pub mod tracker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use attribution::{AttributionEngine, AttributionStrategy, FirstIncrease};
pub use cache::{UsageCache, UsageGuard, UsageSnapshot};
pub use commands::{Command, CommandContext, CommandHandler, RoleRef};
pub use error::{Error, Result};
pub use grant::{grant_role, GrantOutcome};
pub use mappings::RoleMappingStore;
pub use models::*;
pub use permissions::*;
pub use platform::{InviteCreator, InviteSource, Platform, RoleDirectory, RoleGranter};
pub use state::PorterState;
pub use tracker::{CommunityInfo, InviteTracker, JoinOutcome};
