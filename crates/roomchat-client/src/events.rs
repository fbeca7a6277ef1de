use serde::Serialize;

use roomchat_shared::{ConnectionState, PeerIdentity, Room};
use roomchat_store::Message;

/// Notifications sent *from* the node task to whoever renders it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeNotification {
    /// Connection state or joined room changed.
    StateChanged {
        state: ConnectionState,
        room: Option<Room>,
    },
    /// Connected peers or per-room discovery counts changed.
    PeersChanged {
        connected: Vec<PeerIdentity>,
        counts: Vec<(Room, usize)>,
    },
    /// A message was appended to the open room's list.
    MessageAppended { message: Message },
    /// A message for a room that is not open was stored.
    MessageStored { message: Message },
    /// The open room's list was rebuilt from the store.
    MessagesReloaded {
        room: Option<Room>,
        messages: Vec<Message>,
    },
}
