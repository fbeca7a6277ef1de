use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;

/// One of the eight fixed chat rooms.
///
/// The token (`"A"`..`"H"`) doubles as discovery metadata and as the storage
/// partition key, so changing this set breaks interop with older peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Room {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
}

impl Room {
    pub const ALL: [Room; 8] = [
        Room::A,
        Room::B,
        Room::C,
        Room::D,
        Room::E,
        Room::F,
        Room::G,
        Room::H,
    ];

    /// The wire / storage token for this room.
    pub fn as_str(&self) -> &'static str {
        match self {
            Room::A => "A",
            Room::B => "B",
            Room::C => "C",
            Room::D => "D",
            Room::E => "E",
            Room::F => "F",
            Room::G => "G",
            Room::H => "H",
        }
    }

    pub fn display_name(&self) -> String {
        format!("Room {}", self.as_str())
    }

    pub fn color(&self) -> RoomColor {
        match self {
            Room::A => RoomColor::Blue,
            Room::B => RoomColor::Green,
            Room::C => RoomColor::Orange,
            Room::D => RoomColor::Purple,
            Room::E => RoomColor::Red,
            Room::F => RoomColor::Teal,
            Room::G => RoomColor::Pink,
            Room::H => RoomColor::Yellow,
        }
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Room {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Room::ALL
            .iter()
            .copied()
            .find(|room| room.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownRoom(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomColor {
    Blue,
    Green,
    Orange,
    Purple,
    Red,
    Teal,
    Pink,
    Yellow,
}

/// Opaque transport-level handle of a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerHandle(pub Uuid);

impl PeerHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for PeerHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A remote device as seen through discovery.
///
/// Equality and hashing cover both the transport handle and the display name,
/// so two devices that share a name are still counted as two peers. The
/// transport keeps a handle stable for as long as the device stays
/// discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub handle: PeerHandle,
    pub display_name: String,
}

impl PeerIdentity {
    pub fn new(handle: PeerHandle, display_name: impl Into<String>) -> Self {
        Self {
            handle,
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.display_name, self.handle.short())
    }
}

/// Aggregate connection state of the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No room joined.
    Disconnected,
    /// Room joined and advertising, nobody connected.
    Waiting,
    /// Invitations or handshakes in flight, nobody fully connected yet.
    Connecting,
    /// At least one peer has an active session.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Waiting => "waiting",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}
