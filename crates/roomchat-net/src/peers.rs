//! Discovered peer tracking.
//!
//! Keeps, per room, the peers currently seen advertising that room. Entries
//! outlive a room visit and only go away on a loss event.

use std::collections::HashMap;

use tracing::debug;

use roomchat_shared::{PeerIdentity, Room};

/// Room → discovered peers, deduplicated by [`PeerIdentity`] equality.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    rooms: HashMap<Room, Vec<PeerIdentity>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `peer` under `room`.  Returns `false` if it was already there.
    pub fn add(&mut self, room: Room, peer: PeerIdentity) -> bool {
        let peers = self.rooms.entry(room).or_default();
        if peers.contains(&peer) {
            return false;
        }

        debug!(peer = %peer, room = %room, "Discovered peer");
        peers.push(peer);
        true
    }

    /// Remove `peer` from one room.
    pub fn remove(&mut self, room: Room, peer: &PeerIdentity) -> bool {
        let Some(peers) = self.rooms.get_mut(&room) else {
            return false;
        };
        let before = peers.len();
        peers.retain(|p| p != peer);
        before != peers.len()
    }

    /// Remove `peer` from every room; returns the rooms it was listed in.
    pub fn remove_everywhere(&mut self, peer: &PeerIdentity) -> Vec<Room> {
        let removed_from: Vec<Room> = Room::ALL
            .into_iter()
            .filter(|room| self.remove(*room, peer))
            .collect();

        if !removed_from.is_empty() {
            debug!(peer = %peer, rooms = ?removed_from, "Lost peer");
        }
        removed_from
    }

    /// Peers seen in `room`, in discovery order.
    pub fn peers_in(&self, room: Room) -> &[PeerIdentity] {
        self.rooms.get(&room).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, room: Room, peer: &PeerIdentity) -> bool {
        self.peers_in(room).contains(peer)
    }

    pub fn peer_count(&self, room: Room) -> usize {
        self.peers_in(room).len()
    }

    /// Peer count for every room, in room order.
    pub fn counts(&self) -> Vec<(Room, usize)> {
        Room::ALL
            .into_iter()
            .map(|room| (room, self.peer_count(room)))
            .collect()
    }
}
