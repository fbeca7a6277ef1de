//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use roomchat_shared::constants::PROTOCOL_VERSION;
use roomchat_shared::{MessagePayload, Room};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message, sent or received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier, shared by every copy of the message.
    pub id: Uuid,
    /// When the message was sent (as reported by the sender).
    pub timestamp: DateTime<Utc>,
    /// Stable user id of the author.
    pub sender_id: String,
    /// Author's display name at send time.
    pub sender_name: String,
    /// Room the message was posted in.
    pub room: Room,
    pub text: Option<String>,
    /// Opaque attachment bytes (drawings).
    pub attachment: Option<Vec<u8>>,
    /// Local-only flag, never transmitted.
    pub is_from_current_user: bool,
}

impl Message {
    /// Rebuild a message from its wire form.
    pub fn from_payload(payload: MessagePayload, is_from_current_user: bool) -> Self {
        Self {
            id: payload.id,
            timestamp: payload.timestamp,
            sender_id: payload.sender_id,
            sender_name: payload.sender_name,
            room: payload.room,
            text: payload.text,
            attachment: payload.attachment,
            is_from_current_user,
        }
    }

    /// Wire form of this message; drops `is_from_current_user`.
    pub fn to_payload(&self) -> MessagePayload {
        MessagePayload {
            version: PROTOCOL_VERSION,
            id: self.id,
            timestamp: self.timestamp,
            sender_id: self.sender_id.clone(),
            sender_name: self.sender_name.clone(),
            room: self.room,
            text: self.text.clone(),
            attachment: self.attachment.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Oldest,
    Newest,
}

/// Predicate + sort for message queries. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageQuery {
    pub room: Option<Room>,
    pub id: Option<Uuid>,
    pub order: SortOrder,
}

impl MessageQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn room(room: Room) -> Self {
        Self {
            room: Some(room),
            ..Self::default()
        }
    }

    pub fn id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::Newest;
        self
    }
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// The local user.  Exactly one row exists once the app has started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Generated once on first launch and never changed.
    pub user_id: String,
    pub display_name: String,
}
