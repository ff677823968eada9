use tracing::debug;

use parley_shared::protocol::ServerEvent;
use parley_shared::UserId;

use crate::hub::{Broadcast, ConnectionId, Hub, Subscription, Topic};

/// A connection watching one user's inbox. Outbound only.
pub struct InboxSession {
    hub: Hub,
    owner: UserId,
    connection: ConnectionId,
}

impl InboxSession {
    pub async fn bind(hub: Hub, owner: UserId) -> (Self, Subscription) {
        let connection = ConnectionId::new();
        let subscription = hub.subscribe(Topic::Inbox(owner), connection).await;
        debug!(%owner, %connection, "inbox bound");
        (
            Self {
                hub,
                owner,
                connection,
            },
            subscription,
        )
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn render(&self, broadcast: &Broadcast) -> Option<ServerEvent> {
        match broadcast {
            Broadcast::ThreadUpdate(summary) => Some(ServerEvent::ThreadUpdate(summary.clone())),
            _ => None,
        }
    }

    pub async fn close(self) {
        self.hub
            .unsubscribe(Topic::Inbox(self.owner), self.connection)
            .await;
    }
}
