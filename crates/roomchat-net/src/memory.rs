//! In-process transport.
//!
//! [`MemoryMesh`] connects any number of [`MemoryTransport`]s living in the
//! same process.  It follows the same contract a radio transport would:
//! advertisements reach browsing nodes of the same service type, invitations
//! are answered synchronously by the invitee's responder, and data only flows
//! between sessions that are linked.  Used by the tests and the simulator.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use roomchat_shared::{PeerHandle, PeerIdentity};

use crate::error::TransportError;
use crate::transport::{
    DiscoveryInfo, InvitationResponder, PeerSessionState, SendMode, SendReport, SessionHandle,
    Transport, TransportEvent,
};

struct Node {
    identity: PeerIdentity,
    service_type: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    advertising: Option<DiscoveryInfo>,
    browsing: bool,
    sessions: HashSet<SessionHandle>,
    responder: Option<Arc<dyn InvitationResponder>>,
}

/// Two sessions on two nodes joined by an accepted invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    a: (PeerHandle, SessionHandle),
    b: (PeerHandle, SessionHandle),
}

impl Link {
    fn involves(&self, node: PeerHandle, session: SessionHandle) -> bool {
        self.a == (node, session) || self.b == (node, session)
    }

    /// The far end as seen from `(node, session)`.
    fn other(&self, node: PeerHandle, session: SessionHandle) -> Option<(PeerHandle, SessionHandle)> {
        if self.a == (node, session) {
            Some(self.b)
        } else if self.b == (node, session) {
            Some(self.a)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct MeshState {
    nodes: HashMap<PeerHandle, Node>,
    links: Vec<Link>,
}

impl MeshState {
    fn emit(&self, to: PeerHandle, event: TransportEvent) {
        if let Some(node) = self.nodes.get(&to) {
            // A dropped receiver only means that node stopped listening
            let _ = node.events.send(event);
        }
    }

    fn identity(&self, handle: PeerHandle) -> Option<PeerIdentity> {
        self.nodes.get(&handle).map(|n| n.identity.clone())
    }

    /// Browsing nodes, other than `from`, that share its service type.
    fn browsers_of(&self, from: PeerHandle) -> Vec<PeerHandle> {
        let Some(source) = self.nodes.get(&from) else {
            return Vec::new();
        };
        self.nodes
            .iter()
            .filter(|(handle, node)| {
                **handle != from && node.browsing && node.service_type == source.service_type
            })
            .map(|(handle, _)| *handle)
            .collect()
    }

    fn unlink_session(&mut self, node: PeerHandle, session: SessionHandle) {
        let (dropped, kept): (Vec<Link>, Vec<Link>) = self
            .links
            .drain(..)
            .partition(|link| link.involves(node, session));
        self.links = kept;

        for link in dropped {
            let (a_node, a_session) = link.a;
            let (b_node, b_session) = link.b;
            if let (Some(a), Some(b)) = (self.identity(a_node), self.identity(b_node)) {
                self.emit(
                    a_node,
                    TransportEvent::SessionStateChanged {
                        peer: b,
                        session: a_session,
                        state: PeerSessionState::NotConnected,
                    },
                );
                self.emit(
                    b_node,
                    TransportEvent::SessionStateChanged {
                        peer: a,
                        session: b_session,
                        state: PeerSessionState::NotConnected,
                    },
                );
            }
        }
    }
}

/// A shared in-process medium.  Cloning yields another handle to the same mesh.
#[derive(Clone, Default)]
pub struct MemoryMesh {
    inner: Arc<Mutex<MeshState>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MeshState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a device to the mesh.  Its events arrive on the returned receiver.
    pub fn attach(
        &self,
        display_name: &str,
        service_type: &str,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let identity = PeerIdentity::new(PeerHandle::new(), display_name);

        self.lock().nodes.insert(
            identity.handle,
            Node {
                identity: identity.clone(),
                service_type: service_type.to_string(),
                events: tx,
                advertising: None,
                browsing: false,
                sessions: HashSet::new(),
                responder: None,
            },
        );

        debug!(peer = %identity, service_type, "Attached to memory mesh");

        (
            MemoryTransport {
                mesh: self.clone(),
                local: identity,
            },
            rx,
        )
    }

    /// Number of attached devices.
    pub fn node_count(&self) -> usize {
        self.lock().nodes.len()
    }
}

/// One device's view of a [`MemoryMesh`].  Detaches itself on drop.
pub struct MemoryTransport {
    mesh: MemoryMesh,
    local: PeerIdentity,
}

impl MemoryTransport {
    /// How other devices see this one.
    pub fn local_peer(&self) -> &PeerIdentity {
        &self.local
    }

    /// Leave the mesh: stop advertising, drop every session, forget the node.
    pub fn detach(&self) {
        self.stop_advertising();

        let mut mesh = self.mesh.lock();
        let sessions: Vec<SessionHandle> = mesh
            .nodes
            .get(&self.local.handle)
            .map(|n| n.sessions.iter().copied().collect())
            .unwrap_or_default();
        for session in sessions {
            mesh.unlink_session(self.local.handle, session);
        }
        if mesh.nodes.remove(&self.local.handle).is_some() {
            debug!(peer = %self.local, "Detached from memory mesh");
        }
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.detach();
    }
}

impl Transport for MemoryTransport {
    fn start_advertising(&self, info: &DiscoveryInfo) -> Result<(), TransportError> {
        let mut mesh = self.mesh.lock();
        let node = mesh
            .nodes
            .get_mut(&self.local.handle)
            .ok_or(TransportError::Detached)?;
        node.advertising = Some(info.clone());

        for browser in mesh.browsers_of(self.local.handle) {
            mesh.emit(
                browser,
                TransportEvent::PeerFound {
                    peer: self.local.clone(),
                    info: info.clone(),
                },
            );
        }
        Ok(())
    }

    fn stop_advertising(&self) {
        let mut mesh = self.mesh.lock();
        let was_advertising = mesh
            .nodes
            .get_mut(&self.local.handle)
            .and_then(|node| node.advertising.take())
            .is_some();
        if !was_advertising {
            return;
        }

        for browser in mesh.browsers_of(self.local.handle) {
            mesh.emit(
                browser,
                TransportEvent::PeerLost {
                    peer: self.local.clone(),
                },
            );
        }
    }

    fn start_browsing(&self) -> Result<(), TransportError> {
        let mut mesh = self.mesh.lock();
        let node = mesh
            .nodes
            .get_mut(&self.local.handle)
            .ok_or(TransportError::Detached)?;
        node.browsing = true;
        let service_type = node.service_type.clone();

        let visible: Vec<(PeerIdentity, DiscoveryInfo)> = mesh
            .nodes
            .values()
            .filter(|n| n.identity.handle != self.local.handle && n.service_type == service_type)
            .filter_map(|n| n.advertising.clone().map(|info| (n.identity.clone(), info)))
            .collect();
        for (peer, info) in visible {
            mesh.emit(self.local.handle, TransportEvent::PeerFound { peer, info });
        }
        Ok(())
    }

    fn stop_browsing(&self) {
        if let Some(node) = self.mesh.lock().nodes.get_mut(&self.local.handle) {
            node.browsing = false;
        }
    }

    fn create_session(&self) -> SessionHandle {
        let session = SessionHandle::new();
        if let Some(node) = self.mesh.lock().nodes.get_mut(&self.local.handle) {
            node.sessions.insert(session);
        }
        session
    }

    fn destroy_session(&self, session: SessionHandle) {
        let mut mesh = self.mesh.lock();
        if let Some(node) = mesh.nodes.get_mut(&self.local.handle) {
            node.sessions.remove(&session);
        }
        mesh.unlink_session(self.local.handle, session);
    }

    fn invite(
        &self,
        peer: &PeerIdentity,
        session: SessionHandle,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let responder = {
            let mesh = self.mesh.lock();
            let local = mesh
                .nodes
                .get(&self.local.handle)
                .ok_or(TransportError::Detached)?;
            if !local.sessions.contains(&session) {
                return Err(TransportError::UnknownSession(session));
            }
            let target = mesh
                .nodes
                .get(&peer.handle)
                .ok_or_else(|| TransportError::PeerUnavailable(peer.clone()))?;

            let already_linked = mesh.links.iter().any(|link| {
                link.other(self.local.handle, session)
                    .is_some_and(|(node, _)| node == peer.handle)
            });
            if already_linked {
                debug!(peer = %peer, %session, "Already linked, skipping invitation");
                return Ok(());
            }

            target.responder.clone()
        };

        // The responder runs without the mesh lock, as it would on a radio
        // worker thread.
        let reply = match responder {
            Some(responder) => responder.respond(&self.local),
            None => {
                warn!(peer = %peer, "Invitee has no responder, declining");
                return Ok(());
            }
        };

        debug!(peer = %peer, %session, ?timeout, accept = reply.accept, "Invitation answered");

        let mut mesh = self.mesh.lock();
        let accepted_session = reply.session.filter(|theirs| {
            reply.accept
                && mesh
                    .nodes
                    .get(&peer.handle)
                    .is_some_and(|n| n.sessions.contains(theirs))
                && mesh
                    .nodes
                    .get(&self.local.handle)
                    .is_some_and(|n| n.sessions.contains(&session))
        });

        let Some(theirs) = accepted_session else {
            info!(peer = %peer, "Invitation declined or peer has no session");
            mesh.emit(
                self.local.handle,
                TransportEvent::SessionStateChanged {
                    peer: peer.clone(),
                    session,
                    state: PeerSessionState::NotConnected,
                },
            );
            return Ok(());
        };

        mesh.links.push(Link {
            a: (self.local.handle, session),
            b: (peer.handle, theirs),
        });

        let Some(target_identity) = mesh.identity(peer.handle) else {
            return Err(TransportError::PeerUnavailable(peer.clone()));
        };
        for state in [PeerSessionState::Connecting, PeerSessionState::Connected] {
            mesh.emit(
                self.local.handle,
                TransportEvent::SessionStateChanged {
                    peer: target_identity.clone(),
                    session,
                    state,
                },
            );
            mesh.emit(
                peer.handle,
                TransportEvent::SessionStateChanged {
                    peer: self.local.clone(),
                    session: theirs,
                    state,
                },
            );
        }
        Ok(())
    }

    fn send(
        &self,
        session: SessionHandle,
        data: Bytes,
        peers: &[PeerIdentity],
        _mode: SendMode,
    ) -> SendReport {
        let mesh = self.mesh.lock();
        let mut report = SendReport::default();

        for peer in peers {
            let far_session = mesh.links.iter().find_map(|link| {
                link.other(self.local.handle, session)
                    .filter(|(node, _)| *node == peer.handle)
                    .map(|(_, s)| s)
            });

            match far_session {
                Some(far_session) => {
                    mesh.emit(
                        peer.handle,
                        TransportEvent::DataReceived {
                            peer: self.local.clone(),
                            session: far_session,
                            data: data.clone(),
                        },
                    );
                    report.delivered += 1;
                }
                None => report
                    .failed
                    .push((peer.clone(), TransportError::NotConnected(peer.clone()))),
            }
        }

        report
    }

    fn set_invitation_responder(&self, responder: Arc<dyn InvitationResponder>) {
        if let Some(node) = self.mesh.lock().nodes.get_mut(&self.local.handle) {
            node.responder = Some(responder);
        }
    }
}
