//! Point-in-time view of a running node.
//!
//! The node task owns the live state; callers get a [`NodeSnapshot`] copy
//! on request and never share anything with the task.

use serde::Serialize;

use roomchat_net::ConnectionController;
use roomchat_shared::{ConnectionState, PeerIdentity, Room};
use roomchat_store::{Message, MessageStore, UserProfile};

use crate::replicator::MessageReplicator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    /// The local user.
    pub profile: UserProfile,

    pub state: ConnectionState,

    /// Room currently joined, if any.
    pub room: Option<Room>,

    /// Room whose messages are open, usually the joined one.
    pub open_room: Option<Room>,

    /// Peers in the current session.
    pub connected: Vec<PeerIdentity>,

    /// Discovered peers per room, in room order.
    pub peer_counts: Vec<(Room, usize)>,

    /// Messages of the open room.
    pub messages: Vec<Message>,
}

impl NodeSnapshot {
    pub fn capture<S: MessageStore>(
        controller: &ConnectionController,
        replicator: &MessageReplicator<S>,
    ) -> Self {
        Self {
            profile: replicator.profile().clone(),
            state: controller.state(),
            room: controller.current_room(),
            open_room: replicator.active_room(),
            connected: controller.connected_peers().to_vec(),
            peer_counts: controller.directory().counts(),
            messages: replicator.messages().to_vec(),
        }
    }

    pub fn peer_count(&self, room: Room) -> usize {
        self.peer_counts
            .iter()
            .find(|(r, _)| *r == room)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}
