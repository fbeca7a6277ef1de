//! The current-session slot shared with the transport's invitation path.
//!
//! Everything else the controller owns is touched only by the coordinator.
//! The slot is the exception: the coordinator publishes into it on join and
//! leave, and the transport reads it from its own threads to answer
//! invitations immediately.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use roomchat_shared::PeerIdentity;

use crate::transport::{InvitationReply, InvitationResponder, SessionHandle};

#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<Option<SessionHandle>>>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, session: Option<SessionHandle>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn current(&self) -> Option<SessionHandle> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accepts every invitation into whatever session is current.
///
/// There is no authentication here: the only scoping is the room token in
/// discovery metadata.
#[derive(Debug, Clone)]
pub struct AutoAcceptInvitations {
    slot: SessionSlot,
}

impl AutoAcceptInvitations {
    pub fn new(slot: SessionSlot) -> Self {
        Self { slot }
    }
}

impl InvitationResponder for AutoAcceptInvitations {
    fn respond(&self, from: &PeerIdentity) -> InvitationReply {
        let session = self.slot.current();
        info!(peer = %from, session = ?session, "Accepting invitation");
        InvitationReply {
            accept: true,
            session,
        }
    }
}
