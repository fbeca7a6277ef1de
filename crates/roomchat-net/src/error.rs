use thiserror::Error;

use roomchat_shared::PeerIdentity;

use crate::transport::SessionHandle;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Transport detached")]
    Detached,

    #[error("Unknown session: {0}")]
    UnknownSession(SessionHandle),

    #[error("Peer unavailable: {0}")]
    PeerUnavailable(PeerIdentity),

    #[error("Peer not connected: {0}")]
    NotConnected(PeerIdentity),

    #[error("Advertising failed: {0}")]
    Advertising(String),
}
