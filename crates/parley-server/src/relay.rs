//! Message relay core.
//!
//! Turns one inbound event into store mutations and the broadcasts that
//! follow from them. Every mutation that can change a thread (send,
//! delivery receipt, seen-all) ends in [`Relay::after_mutation`], which
//! republishes the thread summary to both participants' inboxes.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use parley_shared::protocol::SeenItem;
use parley_shared::{ConversationKey, MessageId, MessageStatus, UserId};
use parley_store::{DeliveryOutcome, Message, PendingDelivery, User};

use crate::error::RelayError;
use crate::hub::{Broadcast, ConnectionId, Hub, Topic};
use crate::presence::PresenceStore;
use crate::store::Store;
use crate::summary::summarize;

/// Which kind of mutation touched a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadChange {
    MessageSent,
    Delivered,
    SeenAll,
}

#[derive(Clone)]
pub struct Relay {
    store: Store,
    presence: PresenceStore,
    hub: Hub,
}

impl Relay {
    pub fn new(store: Store, presence: PresenceStore, hub: Hub) -> Self {
        Self {
            store,
            presence,
            hub,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// `message.send`: store, announce, deliver at once if the peer is
    /// reachable, then refresh both inboxes.
    pub async fn send_message(
        &self,
        me: &User,
        peer: &User,
        text: &str,
    ) -> Result<Message, RelayError> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(RelayError::Validation("message text is empty".into()));
        }

        let (sender, receiver) = (me.id, peer.id);
        let mut message = self
            .store
            .run(move |db| db.create_message(sender, receiver, &text))
            .await?;

        let topic = conversation(me.id, peer.id);
        self.hub
            .publish(
                topic,
                Broadcast::MessageNew {
                    message: message.payload(me, peer),
                },
            )
            .await;

        // The message is already stored and announced; a failed immediate
        // delivery leaves it Sent for the next presence flush.
        if self.presence.is_online(peer.id).await {
            let id = message.id;
            match self.store.run(move |db| db.mark_delivered(id)).await {
                Ok(DeliveryOutcome::Delivered(delivered)) => {
                    self.publish_delivered(topic, &delivered).await;
                    message = delivered;
                }
                Ok(_) => {}
                Err(e) => warn!(%id, to = %peer.id, error = %e, "immediate delivery failed"),
            }
        }

        self.after_mutation(me.id, peer.id, ThreadChange::MessageSent)
            .await;

        debug!(id = %message.id, from = %me.id, to = %peer.id, status = %message.status, "message relayed");
        Ok(message)
    }

    /// `receipt.delivered` from `me` for a message `peer` sent them.
    /// Returns whether the message changed state.
    pub async fn confirm_delivered(
        &self,
        me: &User,
        peer: &User,
        id: MessageId,
    ) -> Result<bool, RelayError> {
        let (sender, receiver) = (peer.id, me.id);
        let outcome = self
            .store
            .run(move |db| db.mark_delivered_between(id, sender, receiver))
            .await?;

        match outcome {
            DeliveryOutcome::Unknown => Err(RelayError::NotFound),
            DeliveryOutcome::Unchanged(_) => Ok(false),
            DeliveryOutcome::Delivered(message) => {
                self.publish_delivered(conversation(me.id, peer.id), &message)
                    .await;
                self.after_mutation(me.id, peer.id, ThreadChange::Delivered)
                    .await;
                Ok(true)
            }
        }
    }

    /// `receipt.seen_all`: everything `peer` sent `me` becomes seen.
    pub async fn mark_seen_all(&self, me: &User, peer: &User) -> Result<Vec<SeenItem>, RelayError> {
        let (owner, from) = (me.id, peer.id);
        let items = self
            .store
            .run(move |db| db.mark_all_seen(owner, from))
            .await?;

        if items.is_empty() {
            return Ok(items);
        }

        self.hub
            .publish(
                conversation(me.id, peer.id),
                Broadcast::ReceiptBulkSeen {
                    items: items.clone(),
                },
            )
            .await;
        self.after_mutation(me.id, peer.id, ThreadChange::SeenAll)
            .await;

        Ok(items)
    }

    /// `typing.start` / `typing.stop`.
    pub async fn typing(&self, me: &User, peer: &User, origin: ConnectionId, active: bool) {
        self.hub
            .publish(
                conversation(me.id, peer.id),
                Broadcast::Typing {
                    origin,
                    from: me.username.clone(),
                    active,
                },
            )
            .await;
    }

    /// A presence connection for `me` opened: mark online and flush the
    /// receipts that piled up while `me` was away.
    pub async fn presence_connected(&self, me: &User) -> Result<Vec<PendingDelivery>, RelayError> {
        self.presence.mark_online(me.id).await;

        let receiver = me.id;
        let flushed = self
            .store
            .run(move |db| db.deliver_all_pending(receiver))
            .await?;

        let mut senders = Vec::new();
        let mut seen = HashSet::new();
        for item in &flushed {
            self.hub
                .publish(
                    conversation(item.sender_id, me.id),
                    Broadcast::ReceiptUpdate {
                        message_id: item.message_id,
                        status: MessageStatus::Delivered,
                        ts: item.delivered_at,
                    },
                )
                .await;
            if seen.insert(item.sender_id) {
                senders.push(item.sender_id);
            }
        }

        // Only the senders' rows change: their pending ticks flipped.
        for sender in senders {
            let summary = summarize(&self.store, sender, me.id).await;
            self.hub
                .publish(Topic::Inbox(sender), Broadcast::ThreadUpdate(summary))
                .await;
        }

        if !flushed.is_empty() {
            info!(user = %me.id, delivered = flushed.len(), "flushed pending messages");
        }
        Ok(flushed)
    }

    /// `ping` on a presence connection.
    pub async fn heartbeat(&self, me: UserId) {
        self.presence.refresh(me).await;
    }

    /// Post-mutation hook: recompute the thread from each side and push it
    /// to that side's inbox.
    pub async fn after_mutation(&self, a: UserId, b: UserId, change: ThreadChange) {
        let for_a = summarize(&self.store, a, b).await;
        let for_b = summarize(&self.store, b, a).await;

        self.hub
            .publish(Topic::Inbox(a), Broadcast::ThreadUpdate(for_a))
            .await;
        self.hub
            .publish(Topic::Inbox(b), Broadcast::ThreadUpdate(for_b))
            .await;

        debug!(%a, %b, ?change, "thread summaries published");
    }

    async fn publish_delivered(&self, topic: Topic, message: &Message) {
        let Some(ts) = message.delivered_at else {
            return;
        };
        self.hub
            .publish(
                topic,
                Broadcast::ReceiptUpdate {
                    message_id: message.id,
                    status: MessageStatus::Delivered,
                    ts,
                },
            )
            .await;
    }
}

pub fn conversation(a: UserId, b: UserId) -> Topic {
    Topic::Conversation(ConversationKey::new(a, b))
}
