//! Publish/subscribe registry of live connections.
//!
//! A topic is either a conversation domain (both users' connections for one
//! pair) or an inbox domain (every inbox connection of one user). Joins,
//! leaves and publishes take the same lock, so a publish never reaches a
//! connection that already left and never misses one that already joined.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use parley_shared::protocol::{MessagePayload, SeenItem, ServerEvent, ThreadSummary};
use parley_shared::{ConversationKey, MessageId, MessageStatus, UserId};

use chrono::{DateTime, Utc};

/// Identity of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Conversation(ConversationKey),
    Inbox(UserId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Conversation(key) => f.write_str(&key.to_topic()),
            Topic::Inbox(user) => f.write_str(&user.to_inbox_topic()),
        }
    }
}

/// Event raised inside a broadcast domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Broadcast {
    MessageNew {
        message: MessagePayload,
    },
    ReceiptUpdate {
        message_id: MessageId,
        status: MessageStatus,
        ts: DateTime<Utc>,
    },
    ReceiptBulkSeen {
        items: Vec<SeenItem>,
    },
    Typing {
        /// Connection that raised the event; it is not echoed back there.
        origin: ConnectionId,
        from: String,
        active: bool,
    },
    ThreadUpdate(ThreadSummary),
}

impl Broadcast {
    /// Outbound frame for this broadcast, as seen by connection `me`.
    pub fn to_event(&self, me: ConnectionId) -> Option<ServerEvent> {
        let event = match self {
            Broadcast::MessageNew { message } => ServerEvent::MessageNew {
                message: message.clone(),
            },
            Broadcast::ReceiptUpdate {
                message_id,
                status,
                ts,
            } => ServerEvent::ReceiptUpdate {
                message_id: *message_id,
                status: *status,
                ts: *ts,
            },
            Broadcast::ReceiptBulkSeen { items } => ServerEvent::ReceiptBulkSeen {
                items: items.clone(),
            },
            Broadcast::Typing { origin, .. } if *origin == me => return None,
            Broadcast::Typing { from, active, .. } => ServerEvent::Typing {
                from: from.clone(),
                active: *active,
            },
            Broadcast::ThreadUpdate(summary) => ServerEvent::ThreadUpdate(summary.clone()),
        };
        Some(event)
    }
}

struct Subscriber {
    id: ConnectionId,
    sender: mpsc::UnboundedSender<Arc<Broadcast>>,
}

/// Receiving side of one topic membership.
pub struct Subscription {
    pub topic: Topic,
    pub id: ConnectionId,
    pub rx: mpsc::UnboundedReceiver<Arc<Broadcast>>,
}

#[derive(Clone, Default)]
pub struct Hub {
    topics: Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `topic` as connection `id`.
    pub async fn subscribe(&self, topic: Topic, id: ConnectionId) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut topics = self.topics.write().await;
        let members = topics.entry(topic).or_default();
        members.push(Subscriber { id, sender: tx });

        debug!(%topic, connection = %id, members = members.len(), "joined topic");

        Subscription { topic, id, rx }
    }

    /// Leave `topic`. Empty topics are dropped.
    pub async fn unsubscribe(&self, topic: Topic, id: ConnectionId) {
        let mut topics = self.topics.write().await;

        let now_empty = match topics.get_mut(&topic) {
            Some(members) => {
                members.retain(|s| s.id != id);
                members.is_empty()
            }
            None => false,
        };

        if now_empty {
            topics.remove(&topic);
        }

        debug!(%topic, connection = %id, "left topic");
    }

    /// Fan `event` out to every member of `topic`. Returns how many
    /// connections it was handed to. Members whose receiver is gone are
    /// pruned.
    pub async fn publish(&self, topic: Topic, event: Broadcast) -> usize {
        let event = Arc::new(event);
        let mut topics = self.topics.write().await;

        let Some(members) = topics.get_mut(&topic) else {
            return 0;
        };

        members.retain(|s| s.sender.send(event.clone()).is_ok());
        let delivered = members.len();
        if members.is_empty() {
            topics.remove(&topic);
        }

        delivered
    }

    #[cfg(test)]
    pub async fn member_count(&self, topic: Topic) -> usize {
        self.topics
            .read()
            .await
            .get(&topic)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Topic {
        Topic::Conversation(ConversationKey::new(UserId(1), UserId(2)))
    }

    #[tokio::test]
    async fn join_publish_leave() {
        let hub = Hub::new();
        let topic = conversation();

        let mut a = hub.subscribe(topic, ConnectionId::new()).await;
        let mut b = hub.subscribe(topic, ConnectionId::new()).await;
        assert_eq!(hub.member_count(topic).await, 2);

        let sent = hub
            .publish(topic, Broadcast::ReceiptBulkSeen { items: vec![] })
            .await;
        assert_eq!(sent, 2);
        assert!(a.rx.try_recv().is_ok());
        assert!(b.rx.try_recv().is_ok());

        hub.unsubscribe(topic, a.id).await;
        hub.publish(topic, Broadcast::ReceiptBulkSeen { items: vec![] })
            .await;
        assert!(a.rx.try_recv().is_err());
        assert!(b.rx.try_recv().is_ok());

        hub.unsubscribe(topic, b.id).await;
        assert_eq!(hub.member_count(topic).await, 0);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let hub = Hub::new();
        let mut inbox = hub.subscribe(Topic::Inbox(UserId(1)), ConnectionId::new()).await;

        let sent = hub
            .publish(conversation(), Broadcast::ReceiptBulkSeen { items: vec![] })
            .await;
        assert_eq!(sent, 0);
        assert!(inbox.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receivers_are_pruned() {
        let hub = Hub::new();
        let topic = Topic::Inbox(UserId(5));
        let sub = hub.subscribe(topic, ConnectionId::new()).await;
        drop(sub);

        let sent = hub
            .publish(topic, Broadcast::ThreadUpdate(ThreadSummary::empty()))
            .await;
        assert_eq!(sent, 0);
        assert_eq!(hub.member_count(topic).await, 0);
    }

    #[test]
    fn typing_is_not_echoed_to_its_origin() {
        let origin = ConnectionId::new();
        let other = ConnectionId::new();
        let typing = Broadcast::Typing {
            origin,
            from: "alice".into(),
            active: true,
        };

        assert_eq!(typing.to_event(origin), None);
        assert_eq!(
            typing.to_event(other),
            Some(ServerEvent::Typing {
                from: "alice".into(),
                active: true
            })
        );
    }

    #[test]
    fn other_broadcasts_reach_their_origin_too() {
        let me = ConnectionId::new();
        let update = Broadcast::ReceiptUpdate {
            message_id: MessageId(3),
            status: MessageStatus::Delivered,
            ts: Utc::now(),
        };
        assert!(matches!(
            update.to_event(me),
            Some(ServerEvent::ReceiptUpdate { .. })
        ));
    }
}
