//! Porter Network Library
//!
//! Everything that talks to the outside world.
//!
//! # Architecture
//!
//! - **IntakeServer**: accepts the gateway bridge and turns its frames into events
//! - **BridgeClient**: the bridge side of the same connection
//! - **Protocol**: Length-prefixed JSON messages
//! - **DiscordRest**: platform REST calls (invite listing, roles, invite creation)
//!
//! # Usage
//!
//! ```ignore
//! let (server, mut events) = IntakeServer::start(addr, token).await?;
//! let rest = DiscordRest::new(token)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GatewayEvent::MemberJoined { community, member } => { /* attribute */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod rest;
pub mod server;

pub use client::BridgeClient;
pub use error::{Error, Result};
pub use protocol::{CommandReply, CommandRequest, GatewayEvent, Message};
pub use rest::{invite_url, DiscordRest, DEFAULT_API_BASE};
pub use server::IntakeServer;

/// Default port for the intake server
pub const DEFAULT_PORT: u16 = 7331;
