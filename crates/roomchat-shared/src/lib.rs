//! Types shared by every roomchat crate: rooms, peer identities, the wire
//! payload and protocol constants.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::MessagePayload;
pub use types::{ConnectionState, PeerHandle, PeerIdentity, Room, RoomColor};
