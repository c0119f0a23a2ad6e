//! Prefix commands for managing invite-role mappings
//!
//! `!createinvite <role> [max_uses] [max_age]`, `!listinvites`, `!clearinvites`.
//! Only the mapping store is touched; the usage cache is left alone.
//! `!clearinvites` is scoped to the invoking community.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::{ChannelId, CommunityId, InviteOptions, MemberId, Role, RoleId};
use crate::permissions::{CommandAction, PermissionMatrix, Privilege};
use crate::platform::Platform;
use crate::state::PorterState;

pub const DEFAULT_PREFIX: &str = "!";

/// How a command names a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    Id(RoleId),
    Name(String),
}

impl RoleRef {
    /// Accepts a mention (`<@&123>`), a bare id, or a role name
    pub fn parse(s: &str) -> Self {
        let inner = s
            .strip_prefix("<@&")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(s);
        match inner.parse::<u64>() {
            Ok(id) => RoleRef::Id(RoleId(id)),
            Err(_) => RoleRef::Name(s.to_string()),
        }
    }

    fn resolve(&self, roles: Vec<Role>) -> Option<Role> {
        roles.into_iter().find(|r| match self {
            RoleRef::Id(id) => r.id == *id,
            RoleRef::Name(name) => r.name == *name,
        })
    }
}

impl std::fmt::Display for RoleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoleRef::Id(id) => write!(f, "{}", id),
            RoleRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// A parsed bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateInvite { role: RoleRef, options: InviteOptions },
    ListInvites,
    ClearInvites,
}

impl Command {
    /// Parse a chat message; `Ok(None)` if it is not one of our commands
    pub fn parse(prefix: &str, content: &str) -> Result<Option<Self>> {
        let Some(body) = content.trim().strip_prefix(prefix) else {
            return Ok(None);
        };
        let mut args = body.split_whitespace();
        let Some(name) = args.next() else {
            return Ok(None);
        };

        let command = match name {
            "createinvite" => {
                let role = args
                    .next()
                    .map(RoleRef::parse)
                    .ok_or_else(|| Error::InvalidCommand("missing role".into()))?;
                let max_uses = parse_limit(args.next(), "max_uses")?;
                let max_age = parse_limit(args.next(), "max_age")?;
                Command::CreateInvite {
                    role,
                    options: InviteOptions::default()
                        .with_max_uses(max_uses)
                        .with_max_age(max_age),
                }
            }
            "listinvites" => Command::ListInvites,
            "clearinvites" => Command::ClearInvites,
            _ => return Ok(None),
        };

        if let Some(extra) = args.next() {
            return Err(Error::InvalidCommand(format!("unexpected argument '{}'", extra)));
        }
        Ok(Some(command))
    }

    pub fn action(&self) -> CommandAction {
        match self {
            Command::CreateInvite { .. } => CommandAction::CreateInvite,
            Command::ListInvites => CommandAction::ListMappings,
            Command::ClearInvites => CommandAction::ClearMappings,
        }
    }
}

fn parse_limit(arg: Option<&str>, what: &str) -> Result<u32> {
    match arg {
        None => Ok(0),
        Some(s) => s.parse::<u32>().map_err(|_| {
            Error::InvalidCommand(format!("{} must be a non-negative number, got '{}'", what, s))
        }),
    }
}

/// Where a command was issued and by whom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    pub community: CommunityId,
    pub channel: ChannelId,
    pub invoker: MemberId,
    pub privilege: Privilege,
}

/// Executes commands against the mapping store
pub struct CommandHandler<P: ?Sized> {
    platform: Arc<P>,
    state: Arc<PorterState>,
    prefix: String,
}

impl<P: Platform + ?Sized> CommandHandler<P> {
    pub fn new(platform: Arc<P>, state: Arc<PorterState>) -> Self {
        Self::with_prefix(platform, state, DEFAULT_PREFIX)
    }

    pub fn with_prefix(platform: Arc<P>, state: Arc<PorterState>, prefix: impl Into<String>) -> Self {
        Self {
            platform,
            state,
            prefix: prefix.into(),
        }
    }

    /// Parse and run a chat message; `None` if it was not a command
    pub async fn handle(&self, ctx: &CommandContext, content: &str) -> Option<String> {
        let command = match Command::parse(&self.prefix, content) {
            Ok(Some(command)) => command,
            Ok(None) => return None,
            Err(e) => return Some(describe_error(&e)),
        };

        Some(match self.execute(ctx, &command).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(community = %ctx.community, error = %e, "Command failed");
                describe_error(&e)
            }
        })
    }

    /// Run a parsed command, returning the reply text
    pub async fn execute(&self, ctx: &CommandContext, command: &Command) -> Result<String> {
        if !PermissionMatrix::can_perform(ctx.privilege, command.action()) {
            return Err(Error::PermissionDenied(
                "You need the Manage Server permission to use this command.".into(),
            ));
        }

        match command {
            Command::CreateInvite { role, options } => self.create_invite(ctx, role, *options).await,
            Command::ListInvites => self.list_invites(ctx).await,
            Command::ClearInvites => Ok(self.clear_invites(ctx)),
        }
    }

    async fn create_invite(
        &self,
        ctx: &CommandContext,
        role_ref: &RoleRef,
        options: InviteOptions,
    ) -> Result<String> {
        let roles = self.platform.roles(ctx.community).await?;
        let role = role_ref
            .resolve(roles)
            .ok_or_else(|| Error::NotFound(format!("Role \"{}\" not found.", role_ref)))?;

        let invite = self.platform.create_invite(ctx.channel, options).await?;
        self.state
            .mappings
            .create(ctx.community, invite.code.clone(), role.id);

        tracing::info!(
            community = %ctx.community,
            code = %invite.code,
            role = %role.name,
            role_id = %role.id,
            "Created invite mapped to role"
        );
        Ok(format!(
            "Invite created: {} (Grants role: {})",
            invite.url, role.name
        ))
    }

    async fn list_invites(&self, ctx: &CommandContext) -> Result<String> {
        let mappings = self.state.mappings.list(ctx.community);
        if mappings.is_empty() {
            return Ok("No invite-role mappings set up yet.".to_string());
        }

        let roles = self.platform.roles(ctx.community).await?;
        let lines: Vec<String> = mappings
            .iter()
            .map(|m| {
                let name = roles
                    .iter()
                    .find(|r| r.id == m.role)
                    .map(|r| r.name.as_str())
                    .unwrap_or("Deleted Role");
                format!("Invite `{}` → Role `{}`", m.code, name)
            })
            .collect();
        Ok(lines.join("\n"))
    }

    fn clear_invites(&self, ctx: &CommandContext) -> String {
        let removed = self.state.mappings.clear_community(ctx.community);
        tracing::info!(
            community = %ctx.community,
            removed,
            "Invite-role mappings cleared"
        );
        "Cleared all invite-role mappings for this server.".to_string()
    }
}

fn describe_error(e: &Error) -> String {
    match e {
        Error::PermissionDenied(msg) | Error::NotFound(msg) => msg.clone(),
        Error::InvalidCommand(msg) => format!("Invalid arguments: {}", msg),
        _ => "Something went wrong while running that command.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;

    const G: CommunityId = CommunityId(1);

    fn ctx(privilege: Privilege) -> CommandContext {
        CommandContext {
            community: G,
            channel: ChannelId(10),
            invoker: MemberId(20),
            privilege,
        }
    }

    fn setup() -> (Arc<FakePlatform>, CommandHandler<FakePlatform>) {
        let platform = Arc::new(FakePlatform::new());
        platform.set_roles(G, &[(5, "Guest"), (6, "Friend")]);
        let handler = CommandHandler::new(platform.clone(), Arc::new(PorterState::new()));
        (platform, handler)
    }

    #[test]
    fn test_parse_createinvite() {
        let cmd = Command::parse("!", "!createinvite <@&5> 3 3600").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::CreateInvite {
                role: RoleRef::Id(RoleId(5)),
                options: InviteOptions {
                    max_uses: 3,
                    max_age_secs: 3600
                }
            }
        );

        let cmd = Command::parse("!", "!createinvite Guest").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::CreateInvite {
                role: RoleRef::Name("Guest".into()),
                options: InviteOptions::default()
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_arguments() {
        assert!(Command::parse("!", "!createinvite").is_err());
        assert!(Command::parse("!", "!createinvite 5 -1").is_err());
        assert!(Command::parse("!", "!listinvites now").is_err());
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(Command::parse("!", "hello").unwrap(), None);
        assert_eq!(Command::parse("!", "!play music").unwrap(), None);
        assert_eq!(Command::parse("!", "!").unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let (platform, handler) = setup();
        let manager = ctx(Privilege::ManageCommunity);

        let reply = handler.handle(&manager, "!createinvite <@&5> 1").await.unwrap();
        assert_eq!(reply, "Invite created: https://discord.gg/fake1 (Grants role: Guest)");
        assert_eq!(platform.created_invites()[0].1.max_uses, 1);

        let reply = handler.handle(&manager, "!listinvites").await.unwrap();
        assert_eq!(reply, "Invite `fake1` → Role `Guest`");
    }

    #[tokio::test]
    async fn test_list_shows_deleted_roles() {
        let (platform, handler) = setup();
        let manager = ctx(Privilege::ManageCommunity);
        handler.handle(&manager, "!createinvite Friend").await;
        platform.set_roles(G, &[(5, "Guest")]);

        let reply = handler.handle(&ctx(Privilege::Member), "!listinvites").await.unwrap();
        assert_eq!(reply, "Invite `fake1` → Role `Deleted Role`");
    }

    #[tokio::test]
    async fn test_list_empty() {
        let (_, handler) = setup();
        let reply = handler.handle(&ctx(Privilege::Member), "!listinvites").await.unwrap();
        assert_eq!(reply, "No invite-role mappings set up yet.");
    }

    #[tokio::test]
    async fn test_members_cannot_create_or_clear() {
        let (platform, handler) = setup();
        let member = ctx(Privilege::Member);

        let reply = handler.handle(&member, "!createinvite 5").await.unwrap();
        assert!(reply.contains("Manage Server"));
        assert!(platform.created_invites().is_empty());

        let reply = handler.handle(&member, "!clearinvites").await.unwrap();
        assert!(reply.contains("Manage Server"));
    }

    #[tokio::test]
    async fn test_unknown_role() {
        let (platform, handler) = setup();
        let reply = handler
            .handle(&ctx(Privilege::ManageCommunity), "!createinvite 999")
            .await
            .unwrap();
        assert_eq!(reply, "Role \"999\" not found.");
        assert!(platform.created_invites().is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let (_, handler) = setup();
        let manager = ctx(Privilege::ManageCommunity);
        handler.handle(&manager, "!createinvite 5").await;
        handler.handle(&manager, "!createinvite 6").await;

        let reply = handler.handle(&manager, "!clearinvites").await.unwrap();
        assert_eq!(reply, "Cleared all invite-role mappings for this server.");
        assert!(handler.state.mappings.is_empty());
    }

    #[tokio::test]
    async fn test_clear_keeps_other_servers() {
        let (_, handler) = setup();
        let other = CommunityId(G.get() + 1);
        handler.state.mappings.create(other, "keep", RoleId(8));
        handler
            .handle(&ctx(Privilege::ManageCommunity), "!createinvite 5")
            .await;

        handler
            .handle(&ctx(Privilege::ManageCommunity), "!clearinvites")
            .await;
        assert!(handler.state.mappings.list(G).is_empty());
        assert_eq!(handler.state.mappings.role_for(other, "keep"), Some(RoleId(8)));
    }
}
