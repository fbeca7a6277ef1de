//! The node task: one tokio task that owns the connection controller and
//! the replicator.
//!
//! Commands from the UI and events from the transport are both fed into the
//! same `select!` loop, so controller and replicator state is only ever
//! touched from this task, in the order things were accepted.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use roomchat_net::{ConnectionController, Transport, TransportEvent};
use roomchat_shared::{ConnectionState, Room};
use roomchat_store::{Database, Message, UserProfile};

use crate::config::NodeConfig;
use crate::events::NodeNotification;
use crate::profile;
use crate::replicator::{MessageReplicator, Received};
use crate::state::NodeSnapshot;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent *into* the node task.
#[derive(Debug)]
pub enum NodeCommand {
    /// Join a room (leaving the current one) and open its messages.
    JoinRoom {
        room: Room,
        reply: oneshot::Sender<ConnectionState>,
    },
    /// Leave the joined room and close its messages.
    LeaveRoom(oneshot::Sender<()>),
    /// Open a room's stored messages without touching the network.
    LoadMessages {
        room: Room,
        reply: oneshot::Sender<Vec<Message>>,
    },
    /// Send a message to the open room.
    Send {
        text: Option<String>,
        attachment: Option<Vec<u8>>,
        reply: oneshot::Sender<Option<Message>>,
    },
    DeleteMessage {
        id: Uuid,
        reply: oneshot::Sender<bool>,
    },
    DeleteRoomMessages {
        room: Room,
        reply: oneshot::Sender<usize>,
    },
    DeleteAllMessages(oneshot::Sender<usize>),
    MessageCount {
        room: Room,
        reply: oneshot::Sender<u64>,
    },
    /// Change the local display name.
    Rename {
        display_name: String,
        reply: oneshot::Sender<UserProfile>,
    },
    Snapshot(oneshot::Sender<NodeSnapshot>),
    /// Leave any room, stop discovery and end the task.
    Shutdown,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable front end for a running node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    cmd_tx: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> anyhow::Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(command(reply_tx))
            .await
            .context("node task is not running")?;
        reply_rx.await.context("node task dropped the request")
    }

    pub async fn join_room(&self, room: Room) -> anyhow::Result<ConnectionState> {
        self.request(|reply| NodeCommand::JoinRoom { room, reply }).await
    }

    pub async fn leave_room(&self) -> anyhow::Result<()> {
        self.request(NodeCommand::LeaveRoom).await
    }

    pub async fn load_messages(&self, room: Room) -> anyhow::Result<Vec<Message>> {
        self.request(|reply| NodeCommand::LoadMessages { room, reply })
            .await
    }

    pub async fn send_message(
        &self,
        text: Option<String>,
        attachment: Option<Vec<u8>>,
    ) -> anyhow::Result<Option<Message>> {
        self.request(|reply| NodeCommand::Send {
            text,
            attachment,
            reply,
        })
        .await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> anyhow::Result<Option<Message>> {
        self.send_message(Some(text.into()), None).await
    }

    pub async fn delete_message(&self, id: Uuid) -> anyhow::Result<bool> {
        self.request(|reply| NodeCommand::DeleteMessage { id, reply })
            .await
    }

    pub async fn delete_room_messages(&self, room: Room) -> anyhow::Result<usize> {
        self.request(|reply| NodeCommand::DeleteRoomMessages { room, reply })
            .await
    }

    pub async fn delete_all_messages(&self) -> anyhow::Result<usize> {
        self.request(NodeCommand::DeleteAllMessages).await
    }

    pub async fn message_count(&self, room: Room) -> anyhow::Result<u64> {
        self.request(|reply| NodeCommand::MessageCount { room, reply })
            .await
    }

    pub async fn rename(&self, display_name: impl Into<String>) -> anyhow::Result<UserProfile> {
        let display_name = display_name.into();
        self.request(|reply| NodeCommand::Rename {
            display_name,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> anyhow::Result<NodeSnapshot> {
        self.request(NodeCommand::Snapshot).await
    }

    /// Ask the task to stop.  Does nothing if it already has.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(NodeCommand::Shutdown).await;
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn a node task over `transport` and `db`.
///
/// Browsing starts immediately so peer counts are known before any room is
/// joined.  Must be called from within a tokio runtime.
///
/// # Returns
///
/// `(handle, notification_rx)`
pub fn spawn_node(
    config: &NodeConfig,
    db: Database,
    user: UserProfile,
    transport: Arc<dyn Transport>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) -> (NodeHandle, mpsc::Receiver<NodeNotification>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(config.channel_capacity);
    let (notif_tx, notif_rx) = mpsc::channel(config.channel_capacity);

    let controller = ConnectionController::new(transport).with_invite_timeout(config.invite_timeout);
    let mut node = Node {
        controller,
        replicator: MessageReplicator::new(db, user),
        notif_tx,
    };

    tokio::spawn(async move {
        info!(user = %node.replicator.profile().display_name, "Node task started");
        node.controller.start_browsing();

        let mut events_open = true;
        loop {
            tokio::select! {
                // --- Commands ---
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(NodeCommand::Shutdown) => {
                            info!("Node shutdown requested");
                            break;
                        }
                        Some(cmd) => node.handle_command(cmd),
                        None => {
                            info!("Command channel closed, shutting down node");
                            break;
                        }
                    }
                }

                // --- Transport events ---
                event = events.recv(), if events_open => {
                    match event {
                        Some(event) => node.handle_transport_event(event),
                        None => {
                            warn!("Transport event stream closed");
                            events_open = false;
                        }
                    }
                }
            }
        }

        node.controller.leave_room();
        node.controller.stop_browsing();
        info!("Node task stopped");
    });

    (NodeHandle { cmd_tx }, notif_rx)
}

struct Node {
    controller: ConnectionController,
    replicator: MessageReplicator<Database>,
    notif_tx: mpsc::Sender<NodeNotification>,
}

impl Node {
    fn handle_command(&mut self, cmd: NodeCommand) {
        match cmd {
            NodeCommand::JoinRoom { room, reply } => {
                let state = self.controller.join_room(room);
                if self.controller.current_room() == Some(room) {
                    self.replicator.load_messages(room);
                } else {
                    self.replicator.close_room();
                }
                self.notify_state();
                self.notify_peers();
                self.notify_reloaded();
                let _ = reply.send(state);
            }
            NodeCommand::LeaveRoom(reply) => {
                self.controller.leave_room();
                self.replicator.close_room();
                self.notify_state();
                self.notify_peers();
                self.notify_reloaded();
                let _ = reply.send(());
            }
            NodeCommand::LoadMessages { room, reply } => {
                let messages = self.replicator.load_messages(room).to_vec();
                self.notify_reloaded();
                let _ = reply.send(messages);
            }
            NodeCommand::Send {
                text,
                attachment,
                reply,
            } => {
                let sent = match self.replicator.active_room() {
                    Some(room) => self.replicator.send(room, text, attachment, &self.controller),
                    None => {
                        debug!("Send requested with no room open");
                        None
                    }
                };
                if let Some(message) = &sent {
                    self.notify(NodeNotification::MessageAppended {
                        message: message.clone(),
                    });
                }
                let _ = reply.send(sent);
            }
            NodeCommand::DeleteMessage { id, reply } => {
                let deleted = self.replicator.delete_message(id);
                if deleted {
                    self.notify_reloaded();
                }
                let _ = reply.send(deleted);
            }
            NodeCommand::DeleteRoomMessages { room, reply } => {
                let removed = self.replicator.delete_room_messages(room);
                self.notify_reloaded();
                let _ = reply.send(removed);
            }
            NodeCommand::DeleteAllMessages(reply) => {
                let removed = self.replicator.delete_all_messages();
                self.notify_reloaded();
                let _ = reply.send(removed);
            }
            NodeCommand::MessageCount { room, reply } => {
                let _ = reply.send(self.replicator.message_count(room));
            }
            NodeCommand::Rename {
                display_name,
                reply,
            } => {
                match profile::rename(self.replicator.store(), &display_name) {
                    Ok(updated) => self.replicator.set_display_name(updated.display_name),
                    Err(e) => warn!(error = %e, "Failed to rename profile"),
                }
                let _ = reply.send(self.replicator.profile().clone());
            }
            NodeCommand::Snapshot(reply) => {
                let _ = reply.send(NodeSnapshot::capture(&self.controller, &self.replicator));
            }
            NodeCommand::Shutdown => {}
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        if let TransportEvent::DataReceived { peer, data, .. } = &event {
            debug!(peer = %peer, len = data.len(), "Data received");
            match self.replicator.on_receive(data) {
                Some(Received::Displayed(message)) => {
                    self.notify(NodeNotification::MessageAppended { message })
                }
                Some(Received::Stored(message)) => {
                    self.notify(NodeNotification::MessageStored { message })
                }
                None => {}
            }
            return;
        }

        let before = (self.controller.state(), self.controller.current_room());
        let peers_changed = self.controller.handle_event(&event);
        if before != (self.controller.state(), self.controller.current_room()) {
            self.notify_state();
        }
        if peers_changed {
            self.notify_peers();
        }
    }

    fn notify_state(&self) {
        self.notify(NodeNotification::StateChanged {
            state: self.controller.state(),
            room: self.controller.current_room(),
        });
    }

    fn notify_peers(&self) {
        self.notify(NodeNotification::PeersChanged {
            connected: self.controller.connected_peers().to_vec(),
            counts: self.controller.directory().counts(),
        });
    }

    fn notify_reloaded(&self) {
        self.notify(NodeNotification::MessagesReloaded {
            room: self.replicator.active_room(),
            messages: self.replicator.messages().to_vec(),
        });
    }

    /// Never blocks the node on a slow reader; a snapshot recovers anything
    /// dropped here.
    fn notify(&self, notification: NodeNotification) {
        match self.notif_tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(notification = ?dropped, "Notification channel full, dropping");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}
