use tracing::{debug, warn};

use parley_shared::protocol::ClientEvent;
use parley_store::User;

use crate::hub::ConnectionId;
use crate::relay::Relay;

/// Heartbeat connection. Holds no hub membership: presence is never pushed.
pub struct PresenceSession {
    relay: Relay,
    me: User,
    connection: ConnectionId,
}

impl PresenceSession {
    /// Mark `me` online and flush receipts that were waiting for them. A
    /// failed flush is logged; the session still binds.
    pub async fn bind(relay: Relay, me: User) -> Self {
        if let Err(e) = relay.presence_connected(&me).await {
            warn!(user = %me.id, error = %e, "pending delivery flush failed");
        }
        Self {
            relay,
            me,
            connection: ConnectionId::new(),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Ping => self.relay.heartbeat(self.me.id).await,
            other => debug!(user = %self.me.id, event = ?other, "ignored on presence connection"),
        }
    }

    pub fn close(self) {
        debug!(user = %self.me.id, "presence connection closed");
    }
}
