//! Per-connection session handlers.
//!
//! Every WebSocket connection runs one session through three states:
//!
//! ```text
//! Connecting --(identity resolved, bind)--> Bound --(socket closed)--> Closed
//!      \--------------(refused)-----------------------------------------^
//! ```
//!
//! Identity is resolved before the upgrade, so a session value only exists
//! in the `Bound` state. Binding returns the hub subscription the socket pump
//! drains; [`Session::close`] is the transition to `Closed`.

mod conversation;
mod inbox;
mod presence;

pub use conversation::ConversationSession;
pub use inbox::InboxSession;
pub use presence::PresenceSession;

use parley_shared::protocol::{ClientEvent, ServerEvent};
use tracing::debug;

use crate::hub::{Broadcast, ConnectionId};

pub enum Session {
    Conversation(ConversationSession),
    Inbox(InboxSession),
    Presence(PresenceSession),
}

impl Session {
    pub fn scope(&self) -> &'static str {
        match self {
            Session::Conversation(_) => "conversation",
            Session::Inbox(_) => "inbox",
            Session::Presence(_) => "presence",
        }
    }

    pub fn connection(&self) -> ConnectionId {
        match self {
            Session::Conversation(s) => s.connection(),
            Session::Inbox(s) => s.connection(),
            Session::Presence(s) => s.connection(),
        }
    }

    /// Handle one inbound text frame to completion. Bad input is dropped.
    pub async fn on_text(&self, text: &str) {
        let event = match ClientEvent::from_json(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(scope = self.scope(), error = %e, "dropping malformed frame");
                return;
            }
        };

        match self {
            Session::Conversation(s) => s.handle_event(event).await,
            Session::Inbox(_) => {}
            Session::Presence(s) => s.handle_event(event).await,
        }
    }

    /// Outbound frame for a broadcast, or `None` when this connection
    /// should not see it.
    pub fn render(&self, broadcast: &Broadcast) -> Option<ServerEvent> {
        match self {
            Session::Conversation(s) => s.render(broadcast),
            Session::Inbox(s) => s.render(broadcast),
            Session::Presence(_) => None,
        }
    }

    pub async fn close(self) {
        match self {
            Session::Conversation(s) => s.close().await,
            Session::Inbox(s) => s.close().await,
            Session::Presence(s) => s.close(),
        }
    }
}
