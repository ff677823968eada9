//! Domain model structs persisted in the SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_shared::protocol::{LastMessage, MessagePayload, PublicUser};
use parley_shared::{MessageId, MessageStatus, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An account known to the relay.  Rows are owned by the account service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A direct message together with its delivery state.
///
/// `delivered_at` is set whenever `status` is `Delivered` or `Seen`;
/// `seen_at` is set iff `status` is `Seen`; `is_read` mirrors `Seen`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
    pub is_read: bool,
}

impl Message {
    /// Wire shape of this message. `sender` and `receiver` must be the rows
    /// behind `sender_id` and `receiver_id`.
    pub fn payload(&self, sender: &User, receiver: &User) -> MessagePayload {
        MessagePayload {
            id: self.id,
            text: self.text.clone(),
            created_at: self.created_at,
            status: self.status,
            delivered_at: self.delivered_at,
            seen_at: self.seen_at,
            is_read: self.is_read,
            sender: sender.public(),
            receiver: receiver.public(),
        }
    }

    /// Same as [`Message::payload`], resolving the two parties from an
    /// unordered pair and annotating the result for `owner`.
    pub fn last_message_for(&self, owner: &User, peer: &User) -> LastMessage {
        let from_me = self.sender_id == owner.id;
        let message = if from_me {
            self.payload(owner, peer)
        } else {
            self.payload(peer, owner)
        };
        LastMessage { message, from_me }
    }
}

/// Outcome of a single delivery receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No message matched the id (and scope, if any).
    Unknown,
    /// The message was already `Delivered` or `Seen`.
    Unchanged(Message),
    /// The message moved from `Sent` to `Delivered`.
    Delivered(Message),
}

/// A message flushed from `Sent` to `Delivered` when its receiver came online.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDelivery {
    pub message_id: MessageId,
    pub sender_id: UserId,
    pub delivered_at: DateTime<Utc>,
}
