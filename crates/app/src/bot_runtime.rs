//! Bot runtime - routes gateway events to per-community workers
//!
//! Each community gets one worker task fed by a queue, so joins and
//! commands in the same community are processed strictly in arrival order
//! while different communities proceed in parallel. Routing never waits on
//! a worker: a stalled fetch in one community holds up only that queue.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use porter_core::{
    CommandContext, CommandHandler, CommunityId, InviteTracker, JoinOutcome, Platform, Privilege,
};
use porter_net::{CommandRequest, GatewayEvent, IntakeServer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Where command replies go
#[async_trait]
pub trait ReplySink: Send + Sync {
    async fn reply(&self, request: &CommandRequest, content: String);

    /// The request was handled and needs no reply
    async fn complete(&self, request: &CommandRequest);
}

#[async_trait]
impl ReplySink for IntakeServer {
    async fn reply(&self, request: &CommandRequest, content: String) {
        if let Err(e) = IntakeServer::reply(self, request.request_id, request.channel, content).await
        {
            tracing::warn!(
                request_id = %request.request_id,
                error = %e,
                "Failed to deliver command reply"
            );
        }
    }

    async fn complete(&self, request: &CommandRequest) {
        IntakeServer::complete(self, request.request_id).await;
    }
}

/// Shared handlers every worker uses
struct Handlers<P> {
    tracker: InviteTracker<P>,
    commands: CommandHandler<P>,
    replies: Arc<dyn ReplySink>,
}

/// What a community worker can be asked to do
#[derive(Debug)]
enum WorkerMessage {
    Event(GatewayEvent),
    /// Finish the queue, forget the community's cache, then exit
    Stop,
}

struct Worker {
    tx: mpsc::UnboundedSender<WorkerMessage>,
    handle: JoinHandle<()>,
}

/// Bot runtime - owns the community workers
pub struct BotRuntime<P> {
    handlers: Arc<Handlers<P>>,
    workers: HashMap<CommunityId, Worker>,
    /// Workers told to stop that may still be draining
    retiring: HashMap<CommunityId, JoinHandle<()>>,
}

impl<P: Platform + 'static> BotRuntime<P> {
    pub fn new(
        tracker: InviteTracker<P>,
        commands: CommandHandler<P>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            handlers: Arc::new(Handlers {
                tracker,
                commands,
                replies,
            }),
            workers: HashMap::new(),
            retiring: HashMap::new(),
        }
    }

    /// Process events until the source closes
    pub async fn run(&mut self, mut events: mpsc::Receiver<GatewayEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        tracing::info!("Event source closed");
    }

    /// Route one event to its community's queue
    pub fn dispatch(&mut self, event: GatewayEvent) {
        match event {
            // Seeding runs inside each community's worker, ahead of its later events
            GatewayEvent::Ready(communities) => {
                tracing::info!(count = communities.len(), "Seeding invite usage");
                for info in communities {
                    let id = info.id;
                    self.send(id, WorkerMessage::Event(GatewayEvent::CommunityAvailable(info)));
                }
            }
            GatewayEvent::CommunityRemoved(community) => {
                let Some(worker) = self.workers.remove(&community) else {
                    self.handlers.tracker.on_community_removed(community);
                    return;
                };
                if worker.tx.send(WorkerMessage::Stop).is_err() {
                    self.handlers.tracker.on_community_removed(community);
                }
                self.retiring.retain(|_, handle| !handle.is_finished());
                self.retiring.insert(community, worker.handle);
            }
            event => {
                let Some(community) = event.community() else {
                    return;
                };
                self.send(community, WorkerMessage::Event(event));
            }
        }
    }

    fn send(&mut self, community: CommunityId, message: WorkerMessage) {
        let tx = self.worker(community);
        if let Err(e) = tx.send(message) {
            tracing::warn!(
                community = %community,
                message = ?e.0,
                "Community worker stopped, dropping event"
            );
            self.workers.remove(&community);
        }
    }

    fn worker(&mut self, community: CommunityId) -> mpsc::UnboundedSender<WorkerMessage> {
        if let Some(worker) = self.workers.get(&community) {
            return worker.tx.clone();
        }

        // A rejoin starts only after the previous worker has drained and forgotten
        let previous = self.retiring.remove(&community);
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(community_worker(
            community,
            self.handlers.clone(),
            previous,
            rx,
        ));
        self.workers.insert(
            community,
            Worker {
                tx: tx.clone(),
                handle,
            },
        );
        tx
    }

    /// Number of live community workers
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop accepting events and wait for every worker to finish its queue
    pub async fn shutdown(&mut self) {
        tracing::debug!(workers = self.worker_count(), "Stopping community workers");
        for (_, worker) in self.workers.drain() {
            drop(worker.tx);
            let _ = worker.handle.await;
        }
        for (_, handle) in self.retiring.drain() {
            let _ = handle.await;
        }
    }
}

async fn community_worker<P: Platform>(
    community: CommunityId,
    handlers: Arc<Handlers<P>>,
    previous: Option<JoinHandle<()>>,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }
    tracing::debug!(community = %community, "Community worker started");

    while let Some(message) = rx.recv().await {
        let event = match message {
            WorkerMessage::Event(event) => event,
            WorkerMessage::Stop => {
                handlers.tracker.on_community_removed(community);
                break;
            }
        };
        match event {
            GatewayEvent::CommunityAvailable(info) => {
                handlers.tracker.on_community_ready(&info).await;
            }
            GatewayEvent::MemberJoined { community, member } => {
                let outcome = handlers.tracker.on_member_join(&community, &member).await;
                log_join(&community.name, &member.display_name, &outcome);
            }
            GatewayEvent::Command(request) => {
                let ctx = CommandContext {
                    community: request.community.id,
                    channel: request.channel,
                    invoker: request.invoker,
                    privilege: Privilege::from_manage_flag(request.can_manage_community),
                };
                match handlers.commands.handle(&ctx, &request.content).await {
                    Some(reply) => handlers.replies.reply(&request, reply).await,
                    None => handlers.replies.complete(&request).await,
                }
            }
            other => {
                tracing::debug!(event = ?other, "Unexpected event for community worker");
            }
        }
    }

    tracing::debug!(community = %community, "Community worker stopped");
}

fn log_join(community: &str, member: &str, outcome: &JoinOutcome) {
    match outcome {
        JoinOutcome::Granted { code, role } => {
            tracing::debug!(community, member, code = %code, role = %role, "Join attributed");
        }
        JoinOutcome::Unmapped { code } => {
            tracing::debug!(community, member, code = %code, "Join via unmapped invite");
        }
        JoinOutcome::Unattributed => {
            tracing::debug!(community, member, "Join not attributable to an invite");
        }
        JoinOutcome::SnapshotUnavailable | JoinOutcome::GrantFailed { .. } => {
            tracing::debug!(community, member, outcome = ?outcome, "Join left unattributed");
        }
    }
}
