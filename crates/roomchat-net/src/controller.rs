//! Room join lifecycle and the aggregate connection-state machine.
//!
//! The controller is a plain synchronous struct.  It is owned by the
//! coordinator task, which feeds it commands and transport events one at a
//! time; nothing in here is shared except the [`SessionSlot`] handed to the
//! transport's invitation path.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use roomchat_shared::constants::DEFAULT_INVITE_TIMEOUT_SECS;
use roomchat_shared::{ConnectionState, PeerIdentity, Room};

use crate::peers::PeerDirectory;
use crate::session::{AutoAcceptInvitations, SessionSlot};
use crate::transport::{
    DiscoveryInfo, PeerSessionState, SendMode, SendReport, SessionHandle, Transport,
    TransportEvent,
};

pub struct ConnectionController {
    transport: Arc<dyn Transport>,
    invite_timeout: Duration,
    directory: PeerDirectory,
    connected: Vec<PeerIdentity>,
    current_room: Option<Room>,
    session: Option<SessionHandle>,
    slot: SessionSlot,
    state: ConnectionState,
}

impl ConnectionController {
    /// Create a controller and install its auto-accept invitation responder
    /// on the transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let slot = SessionSlot::new();
        transport.set_invitation_responder(Arc::new(AutoAcceptInvitations::new(slot.clone())));

        Self {
            transport,
            invite_timeout: Duration::from_secs(DEFAULT_INVITE_TIMEOUT_SECS),
            directory: PeerDirectory::new(),
            connected: Vec::new(),
            current_room: None,
            session: None,
            slot,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn with_invite_timeout(mut self, timeout: Duration) -> Self {
        self.invite_timeout = timeout;
        self
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn current_room(&self) -> Option<Room> {
        self.current_room
    }

    pub fn current_session(&self) -> Option<SessionHandle> {
        self.session
    }

    /// Peers with an active session in the joined room, in connect order.
    pub fn connected_peers(&self) -> &[PeerIdentity] {
        &self.connected
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Number of peers discovered advertising `room`.
    pub fn peer_count(&self, room: Room) -> usize {
        self.directory.peer_count(room)
    }

    /// The slot the invitation responder reads.
    pub fn session_slot(&self) -> &SessionSlot {
        &self.slot
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Begin discovering peers.  Independent of any room.
    pub fn start_browsing(&self) {
        match self.transport.start_browsing() {
            Ok(()) => info!("Browsing for peers"),
            Err(e) => error!(error = %e, "Failed to start browsing"),
        }
    }

    pub fn stop_browsing(&self) {
        self.transport.stop_browsing();
    }

    /// Join `room`, leaving the current room first.
    pub fn join_room(&mut self, room: Room) -> ConnectionState {
        if self.current_room.is_some() {
            self.leave_room();
        }

        let session = self.transport.create_session();
        self.session = Some(session);
        self.slot.publish(Some(session));
        self.current_room = Some(room);

        if let Err(e) = self.transport.start_advertising(&DiscoveryInfo::for_room(room)) {
            error!(room = %room, error = %e, "Failed to start advertising");
            self.teardown();
            return self.state;
        }

        let peers = self.directory.peers_in(room).to_vec();
        let outstanding = peers
            .iter()
            .filter(|peer| self.invite(peer, session))
            .count();
        // A failed invite never produces a session event.
        self.state = if outstanding == 0 {
            ConnectionState::Waiting
        } else {
            ConnectionState::Connecting
        };

        info!(room = %room, %session, known_peers = peers.len(), state = %self.state, "Joined room");
        self.state
    }

    /// Leave the joined room, if any.  Always ends `Disconnected`.
    pub fn leave_room(&mut self) {
        if let Some(room) = self.current_room {
            info!(room = %room, "Leaving room");
        }
        self.transport.stop_advertising();
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            self.transport.destroy_session(session);
        }
        self.slot.publish(None);
        self.current_room = None;
        self.connected.clear();
        self.state = ConnectionState::Disconnected;
    }

    /// Returns `true` if the invitation is now outstanding.
    fn invite(&self, peer: &PeerIdentity, session: SessionHandle) -> bool {
        debug!(peer = %peer, %session, "Inviting peer");
        match self.transport.invite(peer, session, self.invite_timeout) {
            Ok(()) => true,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Invitation failed");
                false
            }
        }
    }

    /// Send `data` reliably to every connected peer.
    ///
    /// With no session or nobody connected the transport is not touched.
    pub fn broadcast(&self, data: Bytes) -> SendReport {
        let Some(session) = self.session else {
            return SendReport::default();
        };
        if self.connected.is_empty() {
            return SendReport::default();
        }

        let report = self
            .transport
            .send(session, data, &self.connected, SendMode::Reliable);
        for (peer, e) in &report.failed {
            warn!(peer = %peer, error = %e, "Send to peer failed");
        }
        report
    }

    // ------------------------------------------------------------------
    // Transport events
    // ------------------------------------------------------------------

    /// Apply a discovery or session event.  Returns `true` when the peer
    /// directory or the connected list changed.  Data events are ignored
    /// here; they belong to the replicator.
    pub fn handle_event(&mut self, event: &TransportEvent) -> bool {
        match event {
            TransportEvent::PeerFound { peer, info } => self.on_peer_found(peer, info),
            TransportEvent::PeerLost { peer } => self.on_peer_lost(peer),
            TransportEvent::SessionStateChanged {
                peer,
                session,
                state,
            } => self.on_session_state(peer, *session, *state),
            TransportEvent::DataReceived { .. } => false,
        }
    }

    pub fn on_peer_found(&mut self, peer: &PeerIdentity, info: &DiscoveryInfo) -> bool {
        let Some(room) = info.room() else {
            debug!(peer = %peer, info = ?info, "Ignoring advertisement without a known room");
            return false;
        };

        let added = self.directory.add(room, peer.clone());

        if self.current_room == Some(room) {
            if let Some(session) = self.session {
                if !self.connected.contains(peer)
                    && self.invite(peer, session)
                    && self.state == ConnectionState::Waiting
                {
                    self.state = ConnectionState::Connecting;
                }
            }
        }

        added
    }

    pub fn on_peer_lost(&mut self, peer: &PeerIdentity) -> bool {
        !self.directory.remove_everywhere(peer).is_empty()
    }

    pub fn on_session_state(
        &mut self,
        peer: &PeerIdentity,
        session: SessionHandle,
        state: PeerSessionState,
    ) -> bool {
        if self.session != Some(session) {
            debug!(peer = %peer, %session, ?state, "Ignoring state change from a stale session");
            return false;
        }

        match state {
            PeerSessionState::Connected => {
                let added = if self.connected.contains(peer) {
                    false
                } else {
                    self.connected.push(peer.clone());
                    true
                };
                self.state = ConnectionState::Connected;
                info!(peer = %peer, connected = self.connected.len(), "Peer connected");
                added
            }
            PeerSessionState::Connecting => {
                if self.state != ConnectionState::Connected {
                    self.state = ConnectionState::Connecting;
                }
                false
            }
            PeerSessionState::NotConnected => {
                let before = self.connected.len();
                self.connected.retain(|p| p != peer);
                if self.connected.is_empty() && self.current_room.is_some() {
                    self.state = ConnectionState::Waiting;
                }
                info!(peer = %peer, connected = self.connected.len(), "Peer disconnected");
                before != self.connected.len()
            }
        }
    }
}
