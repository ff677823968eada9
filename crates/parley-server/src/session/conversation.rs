use tracing::debug;

use parley_shared::protocol::{ClientEvent, ServerEvent};
use parley_store::User;

use crate::error::RelayError;
use crate::hub::{Broadcast, ConnectionId, Subscription, Topic};
use crate::relay::{conversation, Relay};

/// One connection bound to the conversation between `me` and `peer`.
pub struct ConversationSession {
    relay: Relay,
    me: User,
    peer: User,
    topic: Topic,
    connection: ConnectionId,
}

impl ConversationSession {
    /// Join the pair's conversation domain.
    pub async fn bind(relay: Relay, me: User, peer: User) -> (Self, Subscription) {
        let topic = conversation(me.id, peer.id);
        let connection = ConnectionId::new();
        let subscription = relay.hub().subscribe(topic, connection).await;

        debug!(me = %me.id, peer = %peer.id, %connection, "conversation bound");

        let session = Self {
            relay,
            me,
            peer,
            topic,
            connection,
        };
        (session, subscription)
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub async fn handle_event(&self, event: ClientEvent) {
        if let Err(e) = self.dispatch(event).await {
            match e {
                RelayError::Store(_) => {
                    tracing::warn!(me = %self.me.id, peer = %self.peer.id, error = %e, "event dropped")
                }
                _ => debug!(me = %self.me.id, peer = %self.peer.id, error = %e, "event ignored"),
            }
        }
    }

    async fn dispatch(&self, event: ClientEvent) -> Result<(), RelayError> {
        let relay = &self.relay;
        match event {
            ClientEvent::MessageSend { text } => {
                relay.send_message(&self.me, &self.peer, &text).await?;
            }
            ClientEvent::ReceiptDelivered { message_id } => {
                relay
                    .confirm_delivered(&self.me, &self.peer, message_id)
                    .await?;
            }
            ClientEvent::ReceiptSeenAll => {
                relay.mark_seen_all(&self.me, &self.peer).await?;
            }
            ClientEvent::TypingStart => {
                relay
                    .typing(&self.me, &self.peer, self.connection, true)
                    .await
            }
            ClientEvent::TypingStop => {
                relay
                    .typing(&self.me, &self.peer, self.connection, false)
                    .await
            }
            ClientEvent::Ping => {}
        }
        Ok(())
    }

    pub fn render(&self, broadcast: &Broadcast) -> Option<ServerEvent> {
        broadcast.to_event(self.connection)
    }

    pub async fn close(self) {
        self.relay
            .hub()
            .unsubscribe(self.topic, self.connection)
            .await;
        debug!(me = %self.me.id, peer = %self.peer.id, connection = %self.connection, "conversation closed");
    }
}
