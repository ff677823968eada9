//! # parley-server
//!
//! Real-time direct-messaging relay.
//!
//! This binary provides:
//! - **Conversation sockets** that persist messages and fan out receipts
//!   and typing indicators to both participants
//! - **Inbox sockets** that receive a fresh thread summary after every
//!   change to one of the user's conversations
//! - **Presence sockets** whose heartbeats keep a user reachable for
//!   immediate delivery
//! - **REST API** (axum) for health, user listing, history and presence

mod api;
mod auth;
mod config;
mod error;
mod hub;
mod presence;
mod relay;
mod session;
mod store;
mod summary;
mod ws;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_shared::constants::APP_NAME;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::hub::Hub;
use crate::presence::PresenceStore;
use crate::relay::Relay;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting {} relay v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = Store::open(&config.database_path).await?;
    info!(path = %config.database_path.display(), "Database ready");

    let presence = PresenceStore::new(store.clone(), config.presence_ttl);
    let relay = Relay::new(store, presence.clone(), Hub::new());

    let http_addr = config.http_addr;
    let sweep_every = config.presence_sweep;
    let app_state = AppState::new(relay, config);

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Forget lapsed online markers
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_every);
        loop {
            interval.tick().await;
            let purged = presence.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Swept expired presence markers");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
