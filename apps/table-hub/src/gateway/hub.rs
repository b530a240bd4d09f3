//! The hub actor.
//!
//! A single task owns the [`SubscriptionIndex`] and is the only producer on
//! every connection's outbound queue. Everything else talks to it through a
//! [`HubHandle`]: connection lifecycle and client requests on the command
//! queue, broadcast triggers and finished snapshot fetches on the broadcast
//! queue.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::events::{ActionIntent, EventKind, GameId, GameUpdate, ViewerIdentity};
use super::fanout::{self, ViewerGroup};
use super::registry::SubscriptionIndex;
use super::relay::{self, RelayOutcome};
use super::session::{ConnectionHandle, ConnectionId, EnqueueError};
use crate::query::Personalizer;

/// Requests that change or inspect the subscription index.
#[derive(Debug)]
pub enum HubCommand {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Subscribe {
        conn: ConnectionId,
        game_id: GameId,
        viewer: Option<ViewerIdentity>,
    },
    Unsubscribe {
        conn: ConnectionId,
        game_id: GameId,
    },
    Action {
        conn: ConnectionId,
        intent: ActionIntent,
    },
    Stats(oneshot::Sender<HubStats>),
}

#[derive(Debug)]
pub enum BroadcastRequest {
    /// Fetch fresh personalized snapshots of a game for all its subscribers.
    Refresh { game_id: GameId, event: EventKind },
    /// A finished fetch, ready to be queued.
    Deliver(Delivery),
}

/// One envelope bound for a fixed set of connections.
#[derive(Debug)]
pub struct Delivery {
    pub game_id: GameId,
    pub targets: Vec<ConnectionId>,
    pub update: GameUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub active_games: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("broadcast hub has stopped")]
pub struct HubClosed;

/// Cloneable front door to the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
    broadcasts: mpsc::UnboundedSender<BroadcastRequest>,
}

impl HubHandle {
    fn command(&self, cmd: HubCommand) -> Result<(), HubClosed> {
        self.commands.send(cmd).map_err(|_| HubClosed)
    }

    pub fn register(&self, handle: ConnectionHandle) -> Result<(), HubClosed> {
        self.command(HubCommand::Register(handle))
    }

    pub fn unregister(&self, conn: ConnectionId) -> Result<(), HubClosed> {
        self.command(HubCommand::Unregister(conn))
    }

    pub fn subscribe(
        &self,
        conn: ConnectionId,
        game_id: GameId,
        viewer: Option<ViewerIdentity>,
    ) -> Result<(), HubClosed> {
        self.command(HubCommand::Subscribe { conn, game_id, viewer })
    }

    pub fn unsubscribe(&self, conn: ConnectionId, game_id: GameId) -> Result<(), HubClosed> {
        self.command(HubCommand::Unsubscribe { conn, game_id })
    }

    pub fn relay_action(&self, conn: ConnectionId, intent: ActionIntent) -> Result<(), HubClosed> {
        self.command(HubCommand::Action { conn, intent })
    }

    /// Ask for a fresh snapshot of `game_id` to be pushed to its subscribers.
    /// Returns as soon as the request is queued.
    pub fn broadcast(&self, game_id: impl Into<GameId>, event: EventKind) -> Result<(), HubClosed> {
        self.broadcasts
            .send(BroadcastRequest::Refresh {
                game_id: game_id.into(),
                event,
            })
            .map_err(|_| HubClosed)
    }

    /// Whether the hub task has exited.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    pub async fn stats(&self) -> Result<HubStats, HubClosed> {
        let (tx, rx) = oneshot::channel();
        self.command(HubCommand::Stats(tx))?;
        rx.await.map_err(|_| HubClosed)
    }
}

pub struct Hub {
    index: SubscriptionIndex,
    personalizer: Personalizer,
    commands: mpsc::UnboundedReceiver<HubCommand>,
    broadcasts: mpsc::UnboundedReceiver<BroadcastRequest>,
    loopback: mpsc::UnboundedSender<BroadcastRequest>,
}

impl Hub {
    /// Start the hub task. It runs until every [`HubHandle`] is dropped.
    pub fn spawn(personalizer: Personalizer) -> (HubHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (bc_tx, bc_rx) = mpsc::unbounded_channel();
        let hub = Hub {
            index: SubscriptionIndex::new(),
            personalizer,
            commands: cmd_rx,
            broadcasts: bc_rx,
            loopback: bc_tx.clone(),
        };
        let task = tokio::spawn(hub.run());
        (
            HubHandle {
                commands: cmd_tx,
                broadcasts: bc_tx,
            },
            task,
        )
    }

    async fn run(mut self) {
        tracing::info!("broadcast hub started");
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(req) = self.broadcasts.recv() => self.handle_broadcast(req),
            }
        }
        tracing::info!(
            connections = self.index.connection_count(),
            "broadcast hub stopped"
        );
    }

    fn handle_command(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(handle) => {
                let conn = handle.id.clone();
                if self.index.insert_connection(handle) {
                    tracing::info!(conn_id = %conn, clients = self.index.connection_count(), "client registered");
                }
            }
            HubCommand::Unregister(conn) => {
                if let Some(entry) = self.index.remove_connection(&conn) {
                    tracing::info!(
                        conn_id = %conn,
                        games = entry.games.len(),
                        clients = self.index.connection_count(),
                        "client unregistered"
                    );
                }
            }
            HubCommand::Subscribe { conn, game_id, viewer } => self.subscribe(conn, game_id, viewer),
            HubCommand::Unsubscribe { conn, game_id } => {
                if self.index.unsubscribe(&conn, &game_id) {
                    tracing::info!(conn_id = %conn, game_id = %game_id, "client unsubscribed");
                }
            }
            HubCommand::Action { conn, intent } => self.relay(conn, intent),
            HubCommand::Stats(reply) => {
                let _ = reply.send(HubStats {
                    connections: self.index.connection_count(),
                    active_games: self.index.game_count(),
                });
            }
        }
    }

    fn subscribe(&mut self, conn: ConnectionId, game_id: GameId, viewer: Option<ViewerIdentity>) {
        if let Some(viewer) = viewer {
            self.index.set_viewer(&conn, viewer);
        }
        let Some(added) = self.index.subscribe(&conn, &game_id) else {
            tracing::debug!(conn_id = %conn, game_id = %game_id, "subscribe from unknown connection");
            return;
        };
        let viewer = self.index.get(&conn).and_then(|e| e.viewer.clone());
        tracing::info!(
            conn_id = %conn,
            game_id = %game_id,
            new = added,
            player = viewer.as_ref().map(|v| v.player_address.as_str()).unwrap_or(""),
            subscribers = self.index.subscriber_count(&game_id),
            "client subscribed"
        );

        // Every subscribe, including a repeated one, answers with a snapshot.
        let group = ViewerGroup {
            viewer: viewer.filter(ViewerIdentity::is_complete),
            members: vec![conn],
        };
        fanout::spawn_fetches(
            &self.personalizer,
            &self.loopback,
            &game_id,
            EventKind::State,
            vec![group],
        );
    }

    fn relay(&mut self, conn: ConnectionId, intent: ActionIntent) {
        let viewer = self.index.get(&conn).and_then(|e| e.viewer.as_ref());
        match relay::relay(viewer, intent) {
            RelayOutcome::Accepted { pending, ack } => {
                let targets: Vec<ConnectionId> =
                    self.index.subscribers(&pending.game_id).cloned().collect();
                tracing::info!(
                    conn_id = %conn,
                    game_id = %pending.game_id,
                    subscribers = targets.len(),
                    "relaying pending action"
                );
                self.deliver(Delivery {
                    game_id: pending.game_id.clone(),
                    targets,
                    update: pending,
                });
                self.send_direct(&conn, &ack);
            }
            RelayOutcome::Rejected { error } => self.send_direct(&conn, &error),
        }
    }

    fn handle_broadcast(&mut self, req: BroadcastRequest) {
        match req {
            BroadcastRequest::Refresh { game_id, event } => {
                let groups = fanout::group_subscribers(&self.index, &game_id);
                if groups.is_empty() {
                    tracing::debug!(game_id = %game_id, %event, "no subscribers, skipping broadcast");
                    return;
                }
                let broadcast_id = fanout::spawn_fetches(
                    &self.personalizer,
                    &self.loopback,
                    &game_id,
                    event,
                    groups,
                );
                tracing::info!(
                    broadcast_id = %broadcast_id,
                    game_id = %game_id,
                    %event,
                    subscribers = self.index.subscriber_count(&game_id),
                    "broadcast started"
                );
            }
            BroadcastRequest::Deliver(delivery) => self.deliver(delivery),
        }
    }

    /// Queue one envelope on each target that is still subscribed to the
    /// delivery's game.
    fn deliver(&mut self, delivery: Delivery) {
        let frame = match delivery.update.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(game_id = %delivery.game_id, error = %e, "failed to encode envelope");
                return;
            }
        };
        let mut dropped = Vec::new();
        for conn in &delivery.targets {
            if !self.index.is_subscribed(conn, &delivery.game_id) {
                continue;
            }
            if let Some(entry) = self.index.get(conn) {
                if let Err(e) = entry.handle.try_enqueue(frame.clone()) {
                    dropped.push((conn.clone(), e));
                }
            }
        }
        for (conn, reason) in dropped {
            self.evict(&conn, reason);
        }
    }

    /// Queue an envelope for one connection regardless of its subscriptions.
    fn send_direct(&mut self, conn: &ConnectionId, update: &GameUpdate) {
        let Some(entry) = self.index.get(conn) else {
            return;
        };
        let result = match update.to_frame() {
            Ok(frame) => entry.handle.try_enqueue(frame),
            Err(e) => {
                tracing::error!(conn_id = %conn, error = %e, "failed to encode envelope");
                return;
            }
        };
        if let Err(reason) = result {
            self.evict(conn, reason);
        }
    }

    /// Drop a connection whose queue is full or closed. Removing the entry
    /// drops its sender, which makes the writer close the socket.
    fn evict(&mut self, conn: &ConnectionId, reason: EnqueueError) {
        if self.index.remove_connection(conn).is_some() {
            tracing::warn!(conn_id = %conn, ?reason, "outbound queue unusable, disconnecting client");
        }
    }
}
