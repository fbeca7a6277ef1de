//! The point-to-point transport contract consumed by the controller.
//!
//! A transport advertises and browses for nearby devices, groups connected
//! peers into sessions and moves opaque byte payloads between them. Events
//! come back on a channel owned by whoever constructed the transport; the
//! invitation decision is the one callback that must be answered
//! synchronously, through an [`InvitationResponder`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use uuid::Uuid;

use roomchat_shared::constants::DISCOVERY_ROOM_KEY;
use roomchat_shared::{PeerIdentity, Room};

use crate::error::TransportError;

/// Handle of a transport session.  Cheap to copy, safe to share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(pub Uuid);

impl SessionHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", &self.0.simple().to_string()[..8])
    }
}

/// Per-peer session state reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSessionState {
    NotConnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Reliable,
    Unreliable,
}

/// Key/value metadata published while advertising.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryInfo(BTreeMap<String, String>);

impl DiscoveryInfo {
    pub fn for_room(room: Room) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(DISCOVERY_ROOM_KEY.to_string(), room.as_str().to_string());
        Self(entries)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The advertised room, if present and known.
    pub fn room(&self) -> Option<Room> {
        self.get(DISCOVERY_ROOM_KEY)?.parse().ok()
    }
}

/// Events delivered by a transport, in emission order.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A browsing node saw an advertisement.
    PeerFound {
        peer: PeerIdentity,
        info: DiscoveryInfo,
    },
    /// An advertisement disappeared.
    PeerLost { peer: PeerIdentity },
    /// A peer's state inside one of our sessions changed.
    SessionStateChanged {
        peer: PeerIdentity,
        session: SessionHandle,
        state: PeerSessionState,
    },
    /// Bytes sent to us by a connected peer.
    DataReceived {
        peer: PeerIdentity,
        session: SessionHandle,
        data: Bytes,
    },
}

/// Answer to an incoming invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvitationReply {
    pub accept: bool,
    /// Session the inviter joins; `None` makes an accept ineffective.
    pub session: Option<SessionHandle>,
}

/// Decides incoming invitations.
///
/// Called from the transport's own worker context and must return without
/// waiting on the coordinator.
pub trait InvitationResponder: Send + Sync {
    fn respond(&self, from: &PeerIdentity) -> InvitationReply;
}

/// Outcome of a multi-peer send.
#[derive(Debug, Default)]
pub struct SendReport {
    pub delivered: usize,
    pub failed: Vec<(PeerIdentity, TransportError)>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Point-to-point transport capability.
pub trait Transport: Send + Sync {
    /// Start (or restart with new metadata) advertising this device.
    fn start_advertising(&self, info: &DiscoveryInfo) -> Result<(), TransportError>;

    fn stop_advertising(&self);

    fn start_browsing(&self) -> Result<(), TransportError>;

    fn stop_browsing(&self);

    fn create_session(&self) -> SessionHandle;

    /// Disconnect every peer in the session and forget it.
    fn destroy_session(&self, session: SessionHandle);

    /// Ask `peer` to join `session`.  The result arrives later as
    /// session-state events.
    fn invite(
        &self,
        peer: &PeerIdentity,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn send(
        &self,
        session: SessionHandle,
        data: Bytes,
        peers: &[PeerIdentity],
        mode: SendMode,
    ) -> SendReport;

    /// Install the responder used for incoming invitations.
    fn set_invitation_responder(&self, responder: Arc<dyn InvitationResponder>);
}
