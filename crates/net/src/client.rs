//! TCP client for the bridge side of the intake protocol

use std::net::SocketAddr;

use porter_core::{ChannelId, CommunityId, CommunityInfo, Member, MemberId};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{CommandReply, CommandRequest, Message};

enum ClientCommand {
    Send(Message),
    Disconnect,
}

/// Bridge client handle
pub struct BridgeClient {
    reply_rx: mpsc::Receiver<CommandReply>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

impl BridgeClient {
    /// Connect and authenticate with the bot's intake server
    pub async fn connect(addr: SocketAddr, token: String) -> Result<Self> {
        info!(addr = %addr, "Connecting to intake server");

        let stream = TcpStream::connect(addr).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_frame(&mut writer, &Message::Hello { token }).await?;
        match read_frame(&mut reader).await? {
            Message::Welcome => {}
            Message::Rejected { reason } => return Err(Error::Rejected(reason)),
            _ => return Err(Error::Protocol("Expected Welcome".into())),
        }

        let (reply_tx, reply_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        tokio::spawn(connection_task(reader, writer, reply_tx, cmd_rx));

        Ok(BridgeClient { reply_rx, cmd_tx })
    }

    async fn send(&self, msg: Message) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| Error::NotConnected)
    }

    pub async fn ready(&self, communities: Vec<CommunityInfo>) -> Result<()> {
        self.send(Message::Ready { communities }).await
    }

    pub async fn community_available(&self, community: CommunityInfo) -> Result<()> {
        self.send(Message::CommunityAvailable { community }).await
    }

    pub async fn community_removed(&self, community: CommunityId) -> Result<()> {
        self.send(Message::CommunityRemoved { community }).await
    }

    pub async fn member_joined(&self, community: CommunityInfo, member: Member) -> Result<()> {
        self.send(Message::MemberJoined { community, member }).await
    }

    /// Forward a chat message; returns the request id the reply will carry
    pub async fn command(
        &self,
        community: CommunityInfo,
        channel: ChannelId,
        invoker: MemberId,
        can_manage_community: bool,
        content: &str,
    ) -> Result<Uuid> {
        let req = CommandRequest::new(community, channel, invoker, can_manage_community, content);
        let id = req.request_id;
        self.send(Message::Command(req)).await?;
        Ok(id)
    }

    /// Send a ping
    pub async fn ping(&self) -> Result<()> {
        self.send(Message::Ping).await
    }

    /// Get the next command reply
    pub async fn next_reply(&mut self) -> Option<CommandReply> {
        self.reply_rx.recv().await
    }

    /// Disconnect from the server
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }
}

/// Main connection task
async fn connection_task(
    mut reader: ReadHalf<TcpStream>,
    mut writer: WriteHalf<TcpStream>,
    reply_tx: mpsc::Sender<CommandReply>,
    mut cmd_rx: mpsc::Receiver<ClientCommand>,
) {
    loop {
        tokio::select! {
            result = read_frame(&mut reader) => {
                match result {
                    Ok(Message::Reply(reply)) => {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong) => debug!("Pong"),
                    Ok(_) => debug!("Ignoring unexpected message type"),
                    Err(Error::ConnectionClosed) => {
                        debug!("Server closed connection");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Read error");
                        break;
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send(msg)) => {
                        if let Err(e) = write_frame(&mut writer, &msg).await {
                            warn!(error = %e, "Write error");
                            break;
                        }
                    }
                    Some(ClientCommand::Disconnect) | None => {
                        debug!("Disconnect requested");
                        break;
                    }
                }
            }
        }
    }
}
