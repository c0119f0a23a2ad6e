//! Gateway bridge protocol message types
//!
//! The bridge holds the platform gateway connection and forwards the events
//! the bot cares about. All messages are JSON-serialized and length-prefixed
//! on the wire.

use chrono::{DateTime, Utc};
use porter_core::{ChannelId, CommunityId, CommunityInfo, Member, MemberId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message that may be a bot command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub request_id: Uuid,
    pub community: CommunityInfo,
    pub channel: ChannelId,
    pub invoker: MemberId,
    /// Whether the invoker holds Manage Server in this community
    pub can_manage_community: bool,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl CommandRequest {
    pub fn new(
        community: CommunityInfo,
        channel: ChannelId,
        invoker: MemberId,
        can_manage_community: bool,
        content: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            community,
            channel,
            invoker,
            can_manage_community,
            content: content.into(),
            received_at: Utc::now(),
        }
    }
}

/// Text the bot wants posted back to the channel a command came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub request_id: Uuid,
    pub channel: ChannelId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Bridge protocol messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Bridge authenticates with the shared secret
    Hello { token: String },

    /// Bot accepts the bridge
    Welcome,

    /// Bot rejects the bridge
    Rejected { reason: String },

    /// Gateway session is ready; these are all communities the bot is in
    Ready { communities: Vec<CommunityInfo> },

    /// The bot joined, or regained access to, a community
    CommunityAvailable { community: CommunityInfo },

    /// The bot was removed from a community
    CommunityRemoved { community: CommunityId },

    /// A member arrived in a community
    MemberJoined {
        community: CommunityInfo,
        member: Member,
    },

    /// A chat message to run as a command
    Command(CommandRequest),

    /// Reply to a command
    Reply(CommandReply),

    /// Ping to keep connection alive
    Ping,

    /// Pong response to ping
    Pong,
}

impl Message {
    /// Serialize message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Events handed to the bot runtime
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    Ready(Vec<CommunityInfo>),
    CommunityAvailable(CommunityInfo),
    CommunityRemoved(CommunityId),
    MemberJoined {
        community: CommunityInfo,
        member: Member,
    },
    Command(CommandRequest),
}

impl GatewayEvent {
    /// The community this event is scoped to, if it is scoped to one
    pub fn community(&self) -> Option<CommunityId> {
        match self {
            GatewayEvent::Ready(_) => None,
            GatewayEvent::CommunityAvailable(c) => Some(c.id),
            GatewayEvent::CommunityRemoved(id) => Some(*id),
            GatewayEvent::MemberJoined { community, .. } => Some(community.id),
            GatewayEvent::Command(req) => Some(req.community.id),
        }
    }

    /// Convert a bridge message into an event, if it carries one
    pub fn from_message(msg: Message) -> Option<Self> {
        match msg {
            Message::Ready { communities } => Some(GatewayEvent::Ready(communities)),
            Message::CommunityAvailable { community } => {
                Some(GatewayEvent::CommunityAvailable(community))
            }
            Message::CommunityRemoved { community } => {
                Some(GatewayEvent::CommunityRemoved(community))
            }
            Message::MemberJoined { community, member } => {
                Some(GatewayEvent::MemberJoined { community, member })
            }
            Message::Command(req) => Some(GatewayEvent::Command(req)),
            _ => None,
        }
    }
}
