use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::Method,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use parley_shared::protocol::{MessagePayload, PublicUser};

use crate::auth::{Authenticated, TokenVerifier};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::relay::Relay;
use crate::store::Store;
use crate::ws::{chat_handler, inbox_handler, presence_handler, resolve_peer};

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub store: Store,
    pub verifier: Arc<TokenVerifier>,
    pub config: Arc<ServerConfig>,
    /// Live WebSocket connections.
    pub connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(relay: Relay, config: ServerConfig) -> Self {
        Self {
            store: relay.store().clone(),
            verifier: Arc::new(TokenVerifier::new(&config.jwt_secret)),
            relay,
            config: Arc::new(config),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/users", get(list_users))
        .route("/history/:username", get(history))
        .route("/presence/:username", get(presence))
        .route("/ws/chat/:username", get(chat_handler))
        .route("/ws/inbox", get(inbox_handler))
        .route("/ws/presence", get(presence_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    presence_ttl_secs: u64,
    max_connections: usize,
    connections: usize,
}

#[derive(Serialize)]
struct PresenceResponse {
    online: bool,
    last_seen: Option<DateTime<Utc>>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        presence_ttl_secs: state.relay.presence().ttl().as_secs(),
        max_connections: state.config.max_connections,
        connections: state.connections.load(Ordering::Relaxed),
    })
}

async fn list_users(
    Authenticated(me): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicUser>>, ServerError> {
    let users = state.store.run(move |db| db.list_users_except(me.id)).await?;
    Ok(Json(users.iter().map(|u| u.public()).collect()))
}

async fn history(
    Authenticated(me): Authenticated,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<MessagePayload>>, ServerError> {
    let peer = resolve_peer(&state, &me, username).await?;

    let (a, b) = (me.id, peer.id);
    let messages = state.store.run(move |db| db.history(a, b)).await?;

    let payloads = messages
        .iter()
        .map(|m| {
            if m.sender_id == me.id {
                m.payload(&me, &peer)
            } else {
                m.payload(&peer, &me)
            }
        })
        .collect();
    Ok(Json(payloads))
}

async fn presence(
    Authenticated(_me): Authenticated,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<PresenceResponse>, ServerError> {
    let lookup = username.clone();
    let user = state
        .store
        .run(move |db| db.get_user_by_username(&lookup))
        .await
        .map_err(|e| match e {
            parley_store::StoreError::NotFound => ServerError::NotFound(format!("user {username}")),
            other => other.into(),
        })?;

    let presence = state.relay.presence();
    Ok(Json(PresenceResponse {
        online: presence.is_online(user.id).await,
        last_seen: presence.last_seen(user.id).await?,
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use parley_store::User;

    use super::*;
    use crate::auth::testing::mint;
    use crate::relay::testing::{fixture, Fixture};

    const SECRET: &str = "test-secret";

    struct Harness {
        state: AppState,
        alice: User,
        bob: User,
    }

    async fn harness() -> Harness {
        let Fixture { relay, alice, bob } = fixture().await;
        let config = ServerConfig {
            jwt_secret: SECRET.into(),
            ..ServerConfig::default()
        };
        Harness {
            state: AppState::new(relay, config),
            alice,
            bob,
        }
    }

    async fn get(state: &AppState, uri: &str, as_user: Option<&User>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(user) = as_user {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", mint(SECRET, user.id, 300)),
            );
        }
        let response = build_router(state.clone())
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn health_and_info_are_public() {
        let Harness { state, .. } = harness().await;

        let (status, body) = get(&state, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = get(&state, "/info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Parley Relay");
        assert_eq!(body["presence_ttl_secs"], 60);
    }

    #[tokio::test]
    async fn endpoints_require_a_token() {
        let Harness { state, .. } = harness().await;

        for uri in ["/users", "/history/bob", "/presence/bob", "/ws/inbox", "/ws/chat/bob"] {
            let (status, body) = get(&state, uri, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert!(body["error"].is_string());
        }

        let (status, _) = get(&state, "/users?token=garbage", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_for_unknown_user_is_rejected() {
        let Harness { state, .. } = harness().await;
        let token = mint(SECRET, parley_shared::UserId(999), 300);
        let (status, _) = get(&state, &format!("/users?token={token}"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn users_excludes_the_caller() {
        let Harness { state, alice, .. } = harness().await;
        let (status, body) = get(&state, "/users", Some(&alice)).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<_> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["username"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["bob"]);
    }

    #[tokio::test]
    async fn history_lists_both_directions_in_order() {
        let Harness { state, alice, bob } = harness().await;
        state.relay.send_message(&alice, &bob, "first").await.unwrap();
        state.relay.send_message(&bob, &alice, "second").await.unwrap();

        let (status, body) = get(&state, "/history/bob", Some(&alice)).await;
        assert_eq!(status, StatusCode::OK);
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["text"], "first");
        assert_eq!(items[0]["sender"]["username"], "alice");
        assert_eq!(items[1]["text"], "second");
        assert_eq!(items[1]["receiver"]["username"], "alice");

        let (status, _) = get(&state, "/history/nobody", Some(&alice)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(&state, "/history/alice", Some(&alice)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn presence_reports_online_and_last_seen() {
        let Harness { state, alice, bob } = harness().await;

        let (status, body) = get(&state, "/presence/bob", Some(&alice)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["online"], false);
        assert!(body["last_seen"].is_null());

        state.relay.presence().mark_online(bob.id).await;
        let (_, body) = get(&state, "/presence/bob", Some(&alice)).await;
        assert_eq!(body["online"], true);
        assert!(body["last_seen"].is_string());

        let (status, _) = get(&state, "/presence/nobody", Some(&alice)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
