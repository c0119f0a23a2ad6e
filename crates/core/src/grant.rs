//! Role grant orchestration
//!
//! Every failure here is logged and dropped. Nothing is retried and the
//! joining member is never told.

use crate::error::Error;
use crate::models::{CommunityId, Member, Role, RoleId};
use crate::platform::{RoleDirectory, RoleGranter};

/// What happened when we tried to hand out a mapped role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted(Role),
    /// The mapped role was deleted after the mapping was made
    RoleMissing(RoleId),
    /// The bot lacks the privilege to assign this role
    Forbidden(Role),
    Failed(String),
}

impl GrantOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, GrantOutcome::Granted(_))
    }
}

/// Resolve `role` in the community and apply it to `member`
pub async fn grant_role<P>(
    platform: &P,
    community: CommunityId,
    member: &Member,
    role: RoleId,
    code: &str,
) -> GrantOutcome
where
    P: RoleDirectory + RoleGranter + ?Sized,
{
    let role = match platform.find_role(community, role).await {
        Ok(Some(role)) => role,
        Ok(None) => {
            tracing::warn!(community = %community, role = %role, "Role not found in community");
            return GrantOutcome::RoleMissing(role);
        }
        Err(e) => {
            tracing::warn!(community = %community, role = %role, error = %e, "Failed to resolve role");
            return GrantOutcome::Failed(e.to_string());
        }
    };

    let reason = format!("Joined using invite {}", code);
    match platform.add_role(community, member.id, role.id, &reason).await {
        Ok(()) => {
            tracing::info!(
                community = %community,
                member = %member.display_name,
                role = %role.name,
                code = %code,
                "Assigned role via invite"
            );
            GrantOutcome::Granted(role)
        }
        Err(e) if e.is_permission_denied() => {
            tracing::warn!(
                community = %community,
                role = %role.name,
                "Missing permissions to assign role"
            );
            GrantOutcome::Forbidden(role)
        }
        // Deleted between lookup and grant
        Err(Error::RoleNotFound(_)) => {
            tracing::warn!(community = %community, role = %role.name, "Role vanished before grant");
            GrantOutcome::RoleMissing(role.id)
        }
        Err(e) => {
            tracing::warn!(
                community = %community,
                role = %role.name,
                error = %e,
                "Failed to assign role"
            );
            GrantOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MemberId;
    use crate::testing::FakePlatform;

    const G: CommunityId = CommunityId(3);

    fn alice() -> Member {
        Member::new(MemberId(77), "alice")
    }

    #[tokio::test]
    async fn test_grant_success() {
        let platform = FakePlatform::new();
        platform.set_roles(G, &[(5, "Guest")]);

        let outcome = grant_role(&platform, G, &alice(), RoleId(5), "abc").await;

        assert_eq!(outcome, GrantOutcome::Granted(Role::new(RoleId(5), "Guest")));
        let grants = platform.grants();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].member, MemberId(77));
        assert_eq!(grants[0].reason, "Joined using invite abc");
    }

    #[tokio::test]
    async fn test_deleted_role_aborts() {
        let platform = FakePlatform::new();
        let outcome = grant_role(&platform, G, &alice(), RoleId(5), "abc").await;
        assert_eq!(outcome, GrantOutcome::RoleMissing(RoleId(5)));
        assert!(platform.grants().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_grant_aborts() {
        let platform = FakePlatform::new();
        platform.set_roles(G, &[(5, "Guest")]);
        platform.deny_grants(G, true);

        let outcome = grant_role(&platform, G, &alice(), RoleId(5), "abc").await;
        assert!(matches!(outcome, GrantOutcome::Forbidden(_)));
        assert!(!outcome.is_granted());
    }

    #[tokio::test]
    async fn test_role_deleted_during_grant() {
        let platform = FakePlatform::new();
        platform.set_roles(G, &[(5, "Guest")]);
        platform.lose_roles_on_grant(G, true);

        let outcome = grant_role(&platform, G, &alice(), RoleId(5), "abc").await;
        assert_eq!(outcome, GrantOutcome::RoleMissing(RoleId(5)));
        assert!(platform.grants().is_empty());
    }
}
