// Peer session lifecycle on top of a pluggable point-to-point transport.

pub mod controller;
pub mod error;
pub mod memory;
pub mod peers;
pub mod session;
pub mod transport;

pub use controller::ConnectionController;
pub use error::TransportError;
pub use memory::{MemoryMesh, MemoryTransport};
pub use peers::PeerDirectory;
pub use session::{AutoAcceptInvitations, SessionSlot};
pub use transport::{
    DiscoveryInfo, InvitationReply, InvitationResponder, PeerSessionState, SendMode, SendReport,
    SessionHandle, Transport, TransportEvent,
};
