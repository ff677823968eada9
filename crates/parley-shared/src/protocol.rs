//! JSON envelope exchanged with WebSocket clients.
//!
//! Every frame is an object tagged by its `type` field. Inbound frames that
//! fail to decode are dropped by the caller; there is no error frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{MessageId, MessageStatus, UserId};

/// Events a client may send on any session scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "message.send")]
    MessageSend {
        #[serde(default)]
        text: String,
    },

    #[serde(rename = "receipt.delivered")]
    ReceiptDelivered { message_id: MessageId },

    #[serde(rename = "receipt.seen_all")]
    ReceiptSeenAll,

    #[serde(rename = "typing.start")]
    TypingStart,

    #[serde(rename = "typing.stop")]
    TypingStop,

    /// Presence heartbeat
    #[serde(rename = "ping")]
    Ping,
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Events pushed to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "message.new")]
    MessageNew { message: MessagePayload },

    #[serde(rename = "receipt.update")]
    ReceiptUpdate {
        message_id: MessageId,
        status: MessageStatus,
        ts: DateTime<Utc>,
    },

    #[serde(rename = "receipt.bulk_seen")]
    ReceiptBulkSeen { items: Vec<SeenItem> },

    #[serde(rename = "typing")]
    Typing { from: String, active: bool },

    #[serde(rename = "thread.update")]
    ThreadUpdate(ThreadSummary),
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Public projection of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub seen_at: Option<DateTime<Utc>>,
    pub is_read: bool,
    pub sender: PublicUser,
    pub receiver: PublicUser,
}

/// Most recent message of a thread, relative to the thread's owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    #[serde(flatten)]
    pub message: MessagePayload,
    pub from_me: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenItem {
    pub id: MessageId,
    pub ts: DateTime<Utc>,
}

/// Per-peer inbox row as seen by its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ThreadSummary {
    pub user: Option<PublicUser>,
    pub unread_count: u64,
    pub last_message: Option<LastMessage>,
}

impl ThreadSummary {
    /// Neutral shape used when either side of the thread cannot be resolved.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: i64, name: &str) -> PublicUser {
        PublicUser {
            id: UserId(id),
            username: name.to_string(),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[test]
    fn decodes_inbound_events() {
        assert_eq!(
            ClientEvent::from_json(r#"{"type":"message.send","text":"hi"}"#).unwrap(),
            ClientEvent::MessageSend { text: "hi".into() }
        );
        assert_eq!(
            ClientEvent::from_json(r#"{"type":"receipt.delivered","message_id":42}"#).unwrap(),
            ClientEvent::ReceiptDelivered { message_id: MessageId(42) }
        );
        assert_eq!(
            ClientEvent::from_json(r#"{"type":"receipt.seen_all"}"#).unwrap(),
            ClientEvent::ReceiptSeenAll
        );
        assert_eq!(
            ClientEvent::from_json(r#"{"type":"ping"}"#).unwrap(),
            ClientEvent::Ping
        );
    }

    #[test]
    fn missing_text_decodes_as_empty() {
        assert_eq!(
            ClientEvent::from_json(r#"{"type":"message.send"}"#).unwrap(),
            ClientEvent::MessageSend { text: String::new() }
        );
    }

    #[test]
    fn rejects_malformed_inbound_events() {
        assert!(ClientEvent::from_json("not json").is_err());
        assert!(ClientEvent::from_json(r#"{"text":"no type"}"#).is_err());
        assert!(ClientEvent::from_json(r#"{"type":"message.delete"}"#).is_err());
        assert!(
            ClientEvent::from_json(r#"{"type":"receipt.delivered","message_id":"42"}"#).is_err()
        );
        assert!(ClientEvent::from_json(r#"{"type":"receipt.delivered"}"#).is_err());
    }

    #[test]
    fn thread_update_is_flat() {
        let event = ServerEvent::ThreadUpdate(ThreadSummary {
            user: Some(user(2, "bob")),
            unread_count: 3,
            last_message: None,
        });
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "thread.update",
                "user": {"id": 2, "username": "bob", "first_name": "", "last_name": ""},
                "unread_count": 3,
                "last_message": null,
            })
        );
    }

    #[test]
    fn last_message_carries_from_me_next_to_message_fields() {
        let ts = Utc::now();
        let last = LastMessage {
            message: MessagePayload {
                id: MessageId(9),
                text: "hi".into(),
                created_at: ts,
                status: MessageStatus::Sent,
                delivered_at: None,
                seen_at: None,
                is_read: false,
                sender: user(1, "alice"),
                receiver: user(2, "bob"),
            },
            from_me: true,
        };
        let value = serde_json::to_value(&last).unwrap();
        assert_eq!(value["id"], json!(9));
        assert_eq!(value["status"], json!("sent"));
        assert_eq!(value["from_me"], json!(true));
        assert_eq!(value["sender"]["username"], json!("alice"));
    }

    #[test]
    fn typing_and_receipt_tags() {
        let typing = serde_json::to_value(ServerEvent::Typing {
            from: "alice".into(),
            active: true,
        })
        .unwrap();
        assert_eq!(typing, json!({"type": "typing", "from": "alice", "active": true}));

        let bulk = serde_json::to_value(ServerEvent::ReceiptBulkSeen { items: vec![] }).unwrap();
        assert_eq!(bulk, json!({"type": "receipt.bulk_seen", "items": []}));
    }
}
