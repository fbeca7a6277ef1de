//! Message persistence and replication.
//!
//! The replicator owns the list of messages shown for the active room and
//! is the only writer to the store.  Outgoing messages are persisted before
//! they are handed to the network; incoming ones are persisted whether or not
//! their room is on screen.

use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use roomchat_net::{ConnectionController, SendReport};
use roomchat_shared::constants::PROTOCOL_VERSION;
use roomchat_shared::{MessagePayload, Room};
use roomchat_store::{Message, MessageQuery, MessageStore, UserProfile};

/// Where outgoing payloads go.
pub trait Broadcast {
    /// Send to every currently connected peer.
    fn broadcast(&self, data: Bytes) -> SendReport;
}

impl Broadcast for ConnectionController {
    fn broadcast(&self, data: Bytes) -> SendReport {
        ConnectionController::broadcast(self, data)
    }
}

/// What happened to an incoming payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Persisted and appended to the active room's list.
    Displayed(Message),
    /// Persisted only; its room is not open.
    Stored(Message),
}

pub struct MessageReplicator<S> {
    store: S,
    profile: UserProfile,
    active_room: Option<Room>,
    messages: Vec<Message>,
}

impl<S: MessageStore> MessageReplicator<S> {
    pub fn new(store: S, profile: UserProfile) -> Self {
        Self {
            store,
            profile,
            active_room: None,
            messages: Vec::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    /// Name stamped on messages sent from now on.
    pub fn set_display_name(&mut self, display_name: impl Into<String>) {
        self.profile.display_name = display_name.into();
    }

    pub fn active_room(&self) -> Option<Room> {
        self.active_room
    }

    /// Messages of the active room: store order after a load, arrival order
    /// for anything appended since.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Open `room` and rebuild its list from the store, oldest first.
    pub fn load_messages(&mut self, room: Room) -> &[Message] {
        self.active_room = Some(room);
        self.messages = match self.store.fetch(&MessageQuery::room(room)) {
            Ok(messages) => messages,
            Err(e) => {
                error!(room = %room, error = %e, "Failed to fetch messages");
                Vec::new()
            }
        };
        debug!(room = %room, count = self.messages.len(), "Loaded messages");
        &self.messages
    }

    /// Close the active room.  Later arrivals are stored silently.
    pub fn close_room(&mut self) {
        self.active_room = None;
        self.messages.clear();
    }

    /// Persist a new local message and transmit it to connected peers.
    ///
    /// Returns `None` when nothing was sent: both parts empty, no room
    /// open, or the message could not be persisted.
    pub fn send(
        &mut self,
        room: Room,
        text: Option<String>,
        attachment: Option<Vec<u8>>,
        link: &impl Broadcast,
    ) -> Option<Message> {
        let text = text.filter(|t| !t.trim().is_empty());
        let attachment = attachment.filter(|a| !a.is_empty());
        if text.is_none() && attachment.is_none() {
            debug!("Ignoring empty message");
            return None;
        }
        if self.active_room.is_none() {
            debug!(room = %room, "No room open, not sending");
            return None;
        }

        let message = Message {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender_id: self.profile.user_id.clone(),
            sender_name: self.profile.display_name.clone(),
            room,
            text,
            attachment,
            is_from_current_user: true,
        };

        if let Err(e) = self.store.insert(&message) {
            error!(msg_id = %message.id, error = %e, "Failed to store outgoing message");
            return None;
        }
        self.save();

        if self.active_room == Some(room) {
            self.messages.push(message.clone());
        }

        match message.to_payload().to_bytes() {
            Ok(bytes) => {
                let report = link.broadcast(Bytes::from(bytes));
                info!(
                    msg_id = %message.id,
                    room = %room,
                    delivered = report.delivered,
                    failed = report.failed.len(),
                    "Message sent"
                );
            }
            Err(e) => error!(msg_id = %message.id, error = %e, "Failed to encode message"),
        }

        Some(message)
    }

    /// Decode and persist a payload received from a peer.
    ///
    /// Malformed or empty payloads and repeats of an already stored id are
    /// dropped. A payload from a newer protocol version is logged and kept.
    pub fn on_receive(&mut self, data: &[u8]) -> Option<Received> {
        let payload = match MessagePayload::from_bytes(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(len = data.len(), error = %e, "Dropping malformed payload");
                return None;
            }
        };
        if payload.is_empty() {
            warn!(msg_id = %payload.id, "Dropping payload with no text or attachment");
            return None;
        }
        if payload.is_newer_version() {
            warn!(
                msg_id = %payload.id,
                version = payload.version,
                supported = PROTOCOL_VERSION,
                "Payload from a newer protocol version, reading known fields only"
            );
        }

        let message = Message::from_payload(payload, false);
        match self.store.insert(&message) {
            Ok(true) => {}
            Ok(false) => {
                debug!(msg_id = %message.id, "Duplicate message, already stored");
                return None;
            }
            Err(e) => {
                error!(msg_id = %message.id, error = %e, "Failed to store incoming message");
                return None;
            }
        }
        self.save();

        info!(
            msg_id = %message.id,
            room = %message.room,
            sender = %message.sender_name,
            "Received message"
        );

        if self.active_room == Some(message.room) {
            self.messages.push(message.clone());
            Some(Received::Displayed(message))
        } else {
            Some(Received::Stored(message))
        }
    }

    /// Delete one message locally.
    pub fn delete_message(&mut self, id: Uuid) -> bool {
        let deleted = match self.store.delete(id) {
            Ok(deleted) => deleted,
            Err(e) => {
                error!(msg_id = %id, error = %e, "Failed to delete message");
                return false;
            }
        };
        self.save();
        self.messages.retain(|m| m.id != id);
        deleted
    }

    /// Delete every message of `room` locally.
    pub fn delete_room_messages(&mut self, room: Room) -> usize {
        let removed = match self.store.delete_matching(&MessageQuery::room(room)) {
            Ok(n) => n,
            Err(e) => {
                error!(room = %room, error = %e, "Failed to delete room messages");
                return 0;
            }
        };
        self.save();
        if self.active_room == Some(room) {
            self.messages.clear();
        }
        info!(room = %room, removed, "Deleted room messages");
        removed
    }

    /// Delete every stored message locally.
    pub fn delete_all_messages(&mut self) -> usize {
        let removed = match self.store.delete_matching(&MessageQuery::all()) {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Failed to delete all messages");
                return 0;
            }
        };
        self.save();
        self.messages.clear();
        info!(removed, "Deleted all messages");
        removed
    }

    pub fn message_count(&self, room: Room) -> u64 {
        self.store
            .count(&MessageQuery::room(room))
            .unwrap_or_else(|e| {
                error!(room = %room, error = %e, "Failed to count messages");
                0
            })
    }

    fn save(&self) {
        if let Err(e) = self.store.save() {
            warn!(error = %e, "Failed to flush store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use roomchat_net::TransportError;
    use roomchat_shared::{PeerHandle, PeerIdentity};
    use roomchat_store::{Database, StoreError};

    #[derive(Default)]
    struct RecordingLink {
        sent: RefCell<Vec<Bytes>>,
    }

    impl Broadcast for RecordingLink {
        fn broadcast(&self, data: Bytes) -> SendReport {
            self.sent.borrow_mut().push(data);
            SendReport {
                delivered: 1,
                failed: Vec::new(),
            }
        }
    }

    /// Reaches the first connected peer, misses the second.
    struct HalfLink;

    impl Broadcast for HalfLink {
        fn broadcast(&self, _data: Bytes) -> SendReport {
            let missed = PeerIdentity::new(PeerHandle::new(), "gone");
            SendReport {
                delivered: 1,
                failed: vec![(missed.clone(), TransportError::NotConnected(missed))],
            }
        }
    }

    /// Every operation fails, as a broken disk would.
    struct BrokenStore;

    impl MessageStore for BrokenStore {
        fn insert(&self, _message: &Message) -> roomchat_store::Result<bool> {
            Err(StoreError::NotFound)
        }
        fn delete(&self, _id: Uuid) -> roomchat_store::Result<bool> {
            Err(StoreError::NotFound)
        }
        fn delete_matching(&self, _query: &MessageQuery) -> roomchat_store::Result<usize> {
            Err(StoreError::NotFound)
        }
        fn save(&self) -> roomchat_store::Result<()> {
            Err(StoreError::NotFound)
        }
        fn fetch(&self, _query: &MessageQuery) -> roomchat_store::Result<Vec<Message>> {
            Err(StoreError::NotFound)
        }
        fn count(&self, _query: &MessageQuery) -> roomchat_store::Result<u64> {
            Err(StoreError::NotFound)
        }
    }

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            user_id: format!("id-{name}"),
            display_name: name.to_string(),
        }
    }

    fn replicator(name: &str) -> MessageReplicator<Database> {
        MessageReplicator::new(Database::open_in_memory().unwrap(), profile(name))
    }

    #[test]
    fn send_persists_appends_and_broadcasts() {
        let mut rep = replicator("ana");
        let link = RecordingLink::default();
        rep.load_messages(Room::A);

        let sent = rep
            .send(Room::A, Some("hi".into()), None, &link)
            .expect("message sent");
        assert!(sent.is_from_current_user);
        assert_eq!(sent.sender_name, "ana");
        assert_eq!(rep.messages(), &[sent.clone()]);
        assert_eq!(link.sent.borrow().len(), 1);

        let reloaded = rep.load_messages(Room::A).to_vec();
        assert_eq!(reloaded, vec![sent]);
    }

    #[test]
    fn partial_delivery_still_counts_as_sent() {
        let mut rep = replicator("ana");
        rep.load_messages(Room::D);

        let sent = rep
            .send(Room::D, Some("some of you".into()), None, &HalfLink)
            .expect("message sent");
        assert_eq!(rep.messages(), &[sent.clone()]);
        assert_eq!(rep.message_count(Room::D), 1);
        assert_eq!(rep.load_messages(Room::D).to_vec(), vec![sent]);
    }

    #[test]
    fn send_requires_content_and_open_room() {
        let mut rep = replicator("ana");
        let link = RecordingLink::default();

        assert!(rep.send(Room::A, Some("hi".into()), None, &link).is_none());

        rep.load_messages(Room::A);
        assert!(rep.send(Room::A, None, None, &link).is_none());
        assert!(rep.send(Room::A, Some("   ".into()), None, &link).is_none());
        assert!(link.sent.borrow().is_empty());
        assert_eq!(rep.message_count(Room::A), 0);

        assert!(rep.send(Room::A, None, Some(vec![1, 2]), &link).is_some());
    }

    #[test]
    fn round_trip_to_peer() {
        let mut alice = replicator("alice");
        let mut bob = replicator("bob");
        let link = RecordingLink::default();
        alice.load_messages(Room::C);
        bob.load_messages(Room::C);

        let sent = alice
            .send(Room::C, Some("drawing".into()), Some(vec![7, 7, 7]), &link)
            .unwrap();
        let wire = link.sent.borrow()[0].clone();

        let Some(Received::Displayed(got)) = bob.on_receive(&wire) else {
            panic!("expected a displayed message");
        };
        assert_eq!(got.id, sent.id);
        assert_eq!(got.timestamp, sent.timestamp);
        assert_eq!(got.sender_id, sent.sender_id);
        assert_eq!(got.sender_name, sent.sender_name);
        assert_eq!(got.room, sent.room);
        assert_eq!(got.text, sent.text);
        assert_eq!(got.attachment, sent.attachment);
        assert!(!got.is_from_current_user);
        assert_eq!(bob.messages(), &[got]);
    }

    #[test]
    fn receive_for_other_room_is_stored_silently() {
        let mut alice = replicator("alice");
        let mut bob = replicator("bob");
        let link = RecordingLink::default();
        alice.load_messages(Room::E);
        bob.load_messages(Room::A);

        alice.send(Room::E, Some("psst".into()), None, &link);
        let wire = link.sent.borrow()[0].clone();

        assert!(matches!(bob.on_receive(&wire), Some(Received::Stored(_))));
        assert!(bob.messages().is_empty());
        assert_eq!(bob.active_room(), Some(Room::A));

        let later = bob.load_messages(Room::E);
        assert_eq!(later.len(), 1);
        assert!(!later[0].is_from_current_user);
    }

    #[test]
    fn duplicate_delivery_is_stored_once() {
        let mut alice = replicator("alice");
        let mut bob = replicator("bob");
        let link = RecordingLink::default();
        alice.load_messages(Room::B);
        bob.load_messages(Room::B);

        alice.send(Room::B, Some("again".into()), None, &link);
        let wire = link.sent.borrow()[0].clone();

        assert!(bob.on_receive(&wire).is_some());
        assert!(bob.on_receive(&wire).is_none());
        assert_eq!(bob.messages().len(), 1);
        assert_eq!(bob.message_count(Room::B), 1);
    }

    #[test]
    fn empty_payload_is_dropped() {
        let mut rep = replicator("ana");
        rep.load_messages(Room::A);
        let raw = br#"{"id":"67e55044-10b1-426f-9247-bb680e5fe0c8","timestamp":"2024-05-01T10:00:00Z","senderID":"x","senderName":"X","roomID":"A"}"#;
        assert!(rep.on_receive(raw).is_none());
        assert_eq!(rep.message_count(Room::A), 0);
    }

    #[test]
    fn newer_version_payload_is_accepted() {
        let mut rep = replicator("ana");
        rep.load_messages(Room::A);
        let raw = br#"{"version":9,"id":"67e55044-10b1-426f-9247-bb680e5fe0c8","timestamp":"2024-05-01T10:00:00Z","senderID":"x","senderName":"X","roomID":"A","text":"from the future"}"#;

        let Some(Received::Displayed(got)) = rep.on_receive(raw) else {
            panic!("expected a displayed message");
        };
        assert_eq!(got.text.as_deref(), Some("from the future"));
        assert_eq!(rep.message_count(Room::A), 1);
    }

    #[test]
    fn malformed_payload_is_dropped() {
        let mut rep = replicator("ana");
        rep.load_messages(Room::A);
        assert!(rep.on_receive(b"{\"garbage\":true}").is_none());
        assert!(rep.on_receive(&[0xff, 0x00]).is_none());
        assert!(rep.messages().is_empty());
    }

    #[test]
    fn arrival_order_until_reload() {
        let mut bob = replicator("bob");
        bob.load_messages(Room::A);

        let now = Utc::now();
        let newer = Message {
            id: Uuid::new_v4(),
            timestamp: now,
            sender_id: "x".into(),
            sender_name: "X".into(),
            room: Room::A,
            text: Some("newer".into()),
            attachment: None,
            is_from_current_user: false,
        };
        let older = Message {
            id: Uuid::new_v4(),
            timestamp: now - chrono::Duration::seconds(10),
            text: Some("older".into()),
            ..newer.clone()
        };

        bob.on_receive(&newer.to_payload().to_bytes().unwrap());
        bob.on_receive(&older.to_payload().to_bytes().unwrap());
        let shown: Vec<_> = bob.messages().iter().map(|m| m.id).collect();
        assert_eq!(shown, vec![newer.id, older.id]);

        let sorted: Vec<_> = bob.load_messages(Room::A).iter().map(|m| m.id).collect();
        assert_eq!(sorted, vec![older.id, newer.id]);
    }

    #[test]
    fn deletes_are_local_and_scoped() {
        let mut rep = replicator("ana");
        let link = RecordingLink::default();

        rep.load_messages(Room::B);
        let b1 = rep.send(Room::B, Some("b1".into()), None, &link).unwrap();
        rep.send(Room::B, Some("b2".into()), None, &link);
        rep.load_messages(Room::A);
        rep.send(Room::A, Some("a1".into()), None, &link);
        rep.send(Room::A, Some("a2".into()), None, &link);
        let sent_before = link.sent.borrow().len();

        assert_eq!(rep.delete_room_messages(Room::A), 2);
        assert!(rep.messages().is_empty());
        assert!(rep.load_messages(Room::A).is_empty());
        assert_eq!(rep.message_count(Room::B), 2);

        rep.load_messages(Room::B);
        assert!(rep.delete_message(b1.id));
        assert_eq!(rep.messages().len(), 1);
        assert!(!rep.delete_message(b1.id));

        assert_eq!(rep.delete_all_messages(), 1);
        assert!(rep.messages().is_empty());
        assert_eq!(rep.message_count(Room::B), 0);

        assert_eq!(link.sent.borrow().len(), sent_before);
    }

    #[test]
    fn broken_store_degrades_softly() {
        let mut rep = MessageReplicator::new(BrokenStore, profile("ana"));
        let link = RecordingLink::default();

        assert!(rep.load_messages(Room::A).is_empty());
        assert_eq!(rep.active_room(), Some(Room::A));
        assert!(rep.send(Room::A, Some("lost".into()), None, &link).is_none());
        assert!(link.sent.borrow().is_empty());
        assert!(rep.messages().is_empty());

        let payload = Message {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            sender_id: "x".into(),
            sender_name: "X".into(),
            room: Room::A,
            text: Some("hi".into()),
            attachment: None,
            is_from_current_user: false,
        }
        .to_payload();
        assert!(rep.on_receive(&payload.to_bytes().unwrap()).is_none());

        assert!(!rep.delete_message(Uuid::new_v4()));
        assert_eq!(rep.delete_room_messages(Room::A), 0);
        assert_eq!(rep.delete_all_messages(), 0);
        assert_eq!(rep.message_count(Room::A), 0);
    }

    #[test]
    fn rename_applies_to_later_messages() {
        let mut rep = replicator("ana");
        let link = RecordingLink::default();
        rep.load_messages(Room::A);

        let before = rep.send(Room::A, Some("1".into()), None, &link).unwrap();
        rep.set_display_name("bea");
        let after = rep.send(Room::A, Some("2".into()), None, &link).unwrap();

        assert_eq!(before.sender_name, "ana");
        assert_eq!(after.sender_name, "bea");
        assert_eq!(before.sender_id, after.sender_id);
    }
}
