//! Discord REST implementation of the platform traits

use async_trait::async_trait;
use porter_core::{
    ChannelId, CommunityId, CreatedInvite, InviteCreator, InviteOptions, InviteRecord,
    InviteSource, MemberId, Role, RoleDirectory, RoleGranter, RoleId,
};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{Error, Result};

/// Default Discord API base
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Base for shareable invite links
const INVITE_URL_BASE: &str = "https://discord.gg";

/// Role as the API returns it (snowflakes are strings on the wire)
#[derive(Debug, Deserialize)]
struct ApiRole {
    id: String,
    name: String,
}

/// Invite as the API returns it
#[derive(Debug, Deserialize)]
struct ApiInvite {
    code: String,
}

#[derive(Debug, Serialize)]
struct CreateInviteBody {
    max_age: u32,
    max_uses: u32,
    unique: bool,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Authenticated Discord REST client
#[derive(Clone)]
pub struct DiscordRest {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl DiscordRest {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base(token, DEFAULT_API_BASE)
    }

    pub fn with_base(token: impl Into<String>, base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("porter/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    #[instrument(skip(self))]
    async fn fetch_invites(&self, community: CommunityId) -> Result<Vec<InviteRecord>> {
        self.get_json(&format!("/guilds/{}/invites", community)).await
    }

    #[instrument(skip(self))]
    async fn fetch_roles(&self, community: CommunityId) -> Result<Vec<Role>> {
        let roles: Vec<ApiRole> = self.get_json(&format!("/guilds/{}/roles", community)).await?;
        roles
            .into_iter()
            .map(|r| {
                let id = r
                    .id
                    .parse::<u64>()
                    .map_err(|_| Error::Protocol(format!("Bad role id '{}'", r.id)))?;
                Ok(Role::new(RoleId(id), r.name))
            })
            .collect()
    }

    #[instrument(skip(self, reason))]
    async fn put_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        let resp = self
            .http
            .put(self.url(&format!(
                "/guilds/{}/members/{}/roles/{}",
                community, member, role
            )))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .header("X-Audit-Log-Reason", reason)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn post_invite(&self, channel: ChannelId, options: InviteOptions) -> Result<CreatedInvite> {
        let body = CreateInviteBody {
            max_age: options.max_age_secs,
            max_uses: options.max_uses,
            unique: true,
        };
        let resp = self
            .http
            .post(self.url(&format!("/channels/{}/invites", channel)))
            .header(reqwest::header::AUTHORIZATION, self.auth())
            .json(&body)
            .send()
            .await?;
        let invite: ApiInvite = check(resp).await?.json().await?;
        Ok(CreatedInvite {
            url: invite_url(&invite.code),
            code: invite.code,
        })
    }
}

/// Shareable link for an invite code
pub fn invite_url(code: &str) -> String {
    format!("{}/{}", INVITE_URL_BASE, code)
}

/// Turn a non-success response into an API error
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

fn api_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });
    Error::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl InviteSource for DiscordRest {
    async fn list_invites(&self, community: CommunityId) -> porter_core::Result<Vec<InviteRecord>> {
        Ok(self.fetch_invites(community).await?)
    }
}

#[async_trait]
impl RoleDirectory for DiscordRest {
    async fn roles(&self, community: CommunityId) -> porter_core::Result<Vec<Role>> {
        Ok(self.fetch_roles(community).await?)
    }
}

#[async_trait]
impl RoleGranter for DiscordRest {
    async fn add_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
        reason: &str,
    ) -> porter_core::Result<()> {
        match self.put_role(community, member, role, reason).await {
            Err(Error::Api { status: 404, .. }) => Err(porter_core::Error::RoleNotFound(role)),
            other => Ok(other?),
        }
    }
}

#[async_trait]
impl InviteCreator for DiscordRest {
    async fn create_invite(
        &self,
        channel: ChannelId,
        options: InviteOptions,
    ) -> porter_core::Result<CreatedInvite> {
        Ok(self.post_invite(channel, options).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_uses_body_message() {
        let err = api_error(
            StatusCode::FORBIDDEN,
            r#"{"message": "Missing Permissions", "code": 50013}"#,
        );
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Missing Permissions");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_api_error_without_body() {
        let err = api_error(StatusCode::NOT_FOUND, "");
        assert!(matches!(err, Error::Api { status: 404, ref message } if message == "Not Found"));
    }

    #[test]
    fn test_urls() {
        let rest = DiscordRest::with_base("t", "http://localhost:9/api/").unwrap();
        assert_eq!(
            rest.url("/guilds/1/invites"),
            "http://localhost:9/api/guilds/1/invites"
        );
        assert_eq!(rest.auth(), "Bot t");
        assert_eq!(invite_url("abc"), "https://discord.gg/abc");
    }

    #[test]
    fn test_invite_listing_parses() {
        let body = r#"[{"code":"abc","uses":2,"max_uses":0,"channel":{"id":"1"}},{"code":"def","uses":0}]"#;
        let invites: Vec<InviteRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(invites, vec![InviteRecord::new("abc", 2), InviteRecord::new("def", 0)]);
    }
}
