//! TCP intake server for the gateway bridge
//!
//! The bridge connects, authenticates with the shared token, then streams
//! gateway events. Events are handed to the bot runtime over a channel;
//! command replies are routed back to the connection that sent the command.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use porter_core::ChannelId;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{CommandReply, GatewayEvent, Message};

/// Maximum number of simultaneous bridge connections
const MAX_BRIDGES: usize = 4;

/// Queue depth for events waiting on the runtime
const EVENT_QUEUE: usize = 1024;

/// Server state shared across tasks
struct ServerState {
    token: String,
    /// Outgoing queues keyed by connection id
    bridges: HashMap<Uuid, mpsc::Sender<Message>>,
    /// Command request id -> connection that sent it
    pending: HashMap<Uuid, Uuid>,
}

/// Intake server handle
pub struct IntakeServer {
    addr: SocketAddr,
    state: Arc<RwLock<ServerState>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl IntakeServer {
    /// Start listening; events arrive on the returned receiver
    pub async fn start(
        addr: SocketAddr,
        token: String,
    ) -> Result<(Self, mpsc::Receiver<GatewayEvent>)> {
        let listener = TcpListener::bind(addr).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Intake server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let state = Arc::new(RwLock::new(ServerState {
            token,
            bridges: HashMap::new(),
            pending: HashMap::new(),
        }));

        let state_clone = state.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(accept_loop(listener, state_clone, event_tx, shutdown_rx));

        Ok((
            IntakeServer {
                addr: bound_addr,
                state,
                shutdown_tx,
            },
            event_rx,
        ))
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of connected bridges
    pub async fn bridge_count(&self) -> usize {
        self.state.read().await.bridges.len()
    }

    /// Number of forwarded commands still awaiting a reply or completion
    pub async fn pending_count(&self) -> usize {
        self.state.read().await.pending.len()
    }

    /// Send a command reply to the bridge that issued the command
    pub async fn reply(&self, request_id: Uuid, channel: ChannelId, content: String) -> Result<()> {
        let tx = {
            let mut s = self.state.write().await;
            let conn_id = s.pending.remove(&request_id).ok_or(Error::NotConnected)?;
            s.bridges.get(&conn_id).cloned().ok_or(Error::NotConnected)?
        };

        let reply = Message::Reply(CommandReply {
            request_id,
            channel,
            content,
            sent_at: Utc::now(),
        });
        tx.send(reply).await.map_err(|_| Error::NotConnected)
    }

    /// Mark a command as handled without a reply
    ///
    /// Ordinary chat messages are forwarded as commands too; the runtime calls
    /// this for every message it does not answer.
    pub async fn complete(&self, request_id: Uuid) {
        if self.state.write().await.pending.remove(&request_id).is_none() {
            debug!(request_id = %request_id, "Completed unknown request");
        }
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Intake server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    state: Arc<RwLock<ServerState>>,
    event_tx: mpsc::Sender<GatewayEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New bridge connection");
                        let state = state.clone();
                        let event_tx = event_tx.clone();
                        tokio::spawn(handle_connection(stream, addr, state, event_tx));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single bridge connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    state: Arc<RwLock<ServerState>>,
    event_tx: mpsc::Sender<GatewayEvent>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    // First message must be Hello
    if let Err(e) = handle_hello(&mut reader, &state).await {
        warn!(addr = %addr, error = %e, "Bridge handshake failed");
        let reason = match e {
            Error::Rejected(reason) => reason,
            other => other.to_string(),
        };
        let _ = write_frame(&mut writer, &Message::Rejected { reason }).await;
        return;
    }
    if let Err(e) = write_frame(&mut writer, &Message::Welcome).await {
        warn!(addr = %addr, error = %e, "Failed to welcome bridge");
        return;
    }

    let conn_id = Uuid::new_v4();
    let (msg_tx, msg_rx) = mpsc::channel(64);
    state.write().await.bridges.insert(conn_id, msg_tx.clone());
    let writer_handle = tokio::spawn(writer_task(writer, msg_rx));

    info!(addr = %addr, conn_id = %conn_id, "Bridge connected");

    loop {
        match read_frame(&mut reader).await {
            Ok(Message::Ping) => {
                let _ = msg_tx.send(Message::Pong).await;
            }
            Ok(msg) => {
                if let Message::Command(req) = &msg {
                    state.write().await.pending.insert(req.request_id, conn_id);
                }
                match GatewayEvent::from_message(msg) {
                    Some(event) => {
                        if event_tx.send(event).await.is_err() {
                            debug!("Event receiver dropped");
                            break;
                        }
                    }
                    None => debug!(conn_id = %conn_id, "Ignoring unexpected message type"),
                }
            }
            Err(Error::ConnectionClosed) => {
                debug!(conn_id = %conn_id, "Connection closed");
                break;
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Read error");
                break;
            }
        }
    }

    writer_handle.abort();
    {
        let mut s = state.write().await;
        s.bridges.remove(&conn_id);
        s.pending.retain(|_, c| *c != conn_id);
    }

    info!(conn_id = %conn_id, "Bridge disconnected");
}

/// Validate the bridge's Hello
async fn handle_hello(
    reader: &mut ReadHalf<TcpStream>,
    state: &Arc<RwLock<ServerState>>,
) -> Result<()> {
    match read_frame(reader).await? {
        Message::Hello { token } => {
            let s = state.read().await;
            if token != s.token {
                return Err(Error::Rejected("Invalid token".into()));
            }
            if s.bridges.len() >= MAX_BRIDGES {
                return Err(Error::Rejected("Too many bridges".into()));
            }
            Ok(())
        }
        _ => Err(Error::Protocol("Expected Hello".into())),
    }
}

/// Writer task - sends messages to the bridge
async fn writer_task(mut writer: WriteHalf<TcpStream>, mut rx: mpsc::Receiver<Message>) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(error = %e, "Write failed");
            break;
        }
    }
}
