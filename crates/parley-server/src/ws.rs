//! WebSocket endpoints and the per-connection pump.
//!
//! Each upgraded socket runs one task: it forwards hub broadcasts out and
//! feeds inbound frames to the bound [`Session`], one at a time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use parley_store::{StoreError, User};

use crate::api::AppState;
use crate::auth::Authenticated;
use crate::error::ServerError;
use crate::hub::{Broadcast, Subscription};
use crate::session::{ConversationSession, InboxSession, PresenceSession, Session};

/// One slot in the live-connection count, released on drop.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    /// Take a slot, or `None` if `limit` (0 = unlimited) is reached.
    pub fn acquire(counter: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        let previous = counter.fetch_add(1, Ordering::SeqCst);
        if limit != 0 && previous >= limit {
            counter.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self {
            counter: counter.clone(),
        })
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

fn admit(state: &AppState) -> Result<ConnectionGuard, ServerError> {
    ConnectionGuard::acquire(&state.connections, state.config.max_connections).ok_or_else(|| {
        warn!(
            limit = state.config.max_connections,
            "connection refused, limit reached"
        );
        ServerError::Unavailable("too many connections".into())
    })
}

/// The peer named in a conversation route.
pub(crate) async fn resolve_peer(
    state: &AppState,
    me: &User,
    username: String,
) -> Result<User, ServerError> {
    let lookup = username.clone();
    let peer = match state
        .store
        .run(move |db| db.get_user_by_username(&lookup))
        .await
    {
        Ok(peer) => peer,
        Err(StoreError::NotFound) => {
            return Err(ServerError::NotFound(format!("user {username}")))
        }
        Err(e) => return Err(e.into()),
    };

    if peer.id == me.id {
        return Err(ServerError::BadRequest(
            "cannot open a conversation with yourself".into(),
        ));
    }
    Ok(peer)
}

pub async fn chat_handler(
    Authenticated(me): Authenticated,
    State(state): State<AppState>,
    Path(username): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let peer = resolve_peer(&state, &me, username).await?;
    let guard = admit(&state)?;
    let relay = state.relay.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        let (session, subscription) = ConversationSession::bind(relay, me, peer).await;
        pump(socket, Session::Conversation(session), Some(subscription), guard).await;
    }))
}

pub async fn inbox_handler(
    Authenticated(me): Authenticated,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let guard = admit(&state)?;
    let hub = state.relay.hub().clone();

    Ok(ws.on_upgrade(move |socket| async move {
        let (session, subscription) = InboxSession::bind(hub, me.id).await;
        pump(socket, Session::Inbox(session), Some(subscription), guard).await;
    }))
}

pub async fn presence_handler(
    Authenticated(me): Authenticated,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    let guard = admit(&state)?;
    let relay = state.relay.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        let session = PresenceSession::bind(relay, me).await;
        pump(socket, Session::Presence(session), None, guard).await;
    }))
}

async fn next_broadcast(
    rx: &mut Option<UnboundedReceiver<Arc<Broadcast>>>,
) -> Option<Arc<Broadcast>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn pump(
    socket: WebSocket,
    session: Session,
    subscription: Option<Subscription>,
    _guard: ConnectionGuard,
) {
    let (mut sink, mut stream) = socket.split();
    let connection = session.connection();
    match &subscription {
        Some(s) => info!(scope = session.scope(), connection = %s.id, topic = %s.topic, "websocket connected"),
        None => info!(scope = session.scope(), %connection, "websocket connected"),
    }
    let mut rx = subscription.map(|s| s.rx);

    loop {
        tokio::select! {
            Some(broadcast) = next_broadcast(&mut rx) => {
                let Some(event) = session.render(&broadcast) else {
                    continue;
                };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode outbound event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => session.on_text(&text).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    // Control frames are answered by the transport.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(%connection, error = %e, "websocket read failed");
                        break;
                    }
                }
            }
        }
    }

    let scope = session.scope();
    session.close().await;
    info!(scope, %connection, "websocket disconnected");
}
