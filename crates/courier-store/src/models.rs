//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the UI layer.

use chrono::{DateTime, Utc};
use courier_shared::{DeliveryStatus, PublicId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Contact
// ---------------------------------------------------------------------------

/// A cached remote-directory entry, mirroring one device phone-book number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    /// Local row id, private to this device.
    pub id: i64,
    /// Display name as it appears in the device phone book.
    pub name: String,
    /// Canonical national phone number (`0` + nine digits), unique.
    pub phone: String,
    /// Directory-assigned identity.  `None` until the contact has been
    /// reconciled with the remote directory.
    pub public_id: Option<PublicId>,
    /// Avatar URL served by the directory.
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation between exactly two contacts.
///
/// `last_message` / `last_timestamp` duplicate data derivable from the
/// message log; they are maintained on every append so the chat list renders
/// without scanning messages.  The `is_group` flag is schema-reserved; no
/// code path writes group chats yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: i64,
    pub name: String,
    pub public_chat_id: Option<PublicId>,
    pub image_url: Option<String>,
    pub is_group: bool,
    pub last_message: Option<String>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
    pub unread_count: i64,
}

/// One side of a chat.  Keyed by the participant's public id; the local
/// contact row id is a soft reference filled in when the contact is cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatParticipant {
    pub id: i64,
    pub contact_public_id: PublicId,
    pub contact_id: Option<i64>,
    pub chat_id: i64,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A stored message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    /// Local row id; also the insertion-order tie-break for the timeline.
    pub id: i64,
    /// Client-generated id used for idempotent delivery and ack matching.
    pub message_id: Uuid,
    /// Server-assigned id, present once the server has acked the message.
    pub msg_pub_id: Option<PublicId>,
    pub body: String,
    /// `true` if sent from this device, `false` if received.
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub chat_id: i64,
}

/// Payload for appending a message; the store assigns the row id.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub message_id: Uuid,
    pub body: String,
    pub from_me: bool,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub chat_id: i64,
}

impl NewMessage {
    /// An outgoing message stamped now, awaiting delivery.
    pub fn outgoing(chat_id: i64, body: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            body: body.into(),
            from_me: true,
            timestamp: Utc::now(),
            status: DeliveryStatus::Pending,
            chat_id,
        }
    }

    /// An incoming message as delivered by the push channel.
    pub fn incoming(chat_id: i64, message_id: Uuid, body: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id,
            body: body.into(),
            from_me: false,
            timestamp,
            status: DeliveryStatus::Delivered,
            chat_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Media attachment
// ---------------------------------------------------------------------------

/// A media file attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MediaAttachment {
    pub id: i64,
    /// Local URI or remote blob reference.
    pub source: String,
    pub public_id: Option<PublicId>,
    pub message_id: i64,
}

/// Payload for attaching media; the owning message id is supplied by the
/// store at append time.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub source: String,
    pub public_id: Option<PublicId>,
}

/// A timeline entry: one message with its attachments in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineEntry {
    pub message: Message,
    pub attachments: Vec<MediaAttachment>,
}
