//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_HTTP_PORT, PRESENCE_SWEEP_SECS, PRESENCE_TTL_SECS,
};

/// Signing secret used when `JWT_SECRET` is unset. Development only.
pub const DEV_JWT_SECRET: &str = "parley-dev-secret";

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP/WebSocket server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./parley.db`
    pub database_path: PathBuf,

    /// HS256 secret that bearer tokens are signed with.
    /// Env: `JWT_SECRET`
    pub jwt_secret: String,

    /// Lifetime of an online marker without a heartbeat.
    /// Env: `PRESENCE_TTL_SECS`
    pub presence_ttl: Duration,

    /// How often lapsed online markers are swept.
    /// Env: `PRESENCE_SWEEP_SECS`
    pub presence_sweep: Duration,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Parley Relay"`
    pub instance_name: String,

    /// Maximum number of concurrent WebSocket connections (0 = unlimited).
    /// Env: `MAX_CONNECTIONS`
    /// Default: `0`
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./parley.db"),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            presence_ttl: Duration::from_secs(PRESENCE_TTL_SECS),
            presence_sweep: Duration::from_secs(PRESENCE_SWEEP_SECS),
            instance_name: "Parley Relay".to_string(),
            max_connections: 0,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"<redacted>")
            .field("presence_ttl", &self.presence_ttl)
            .field("presence_sweep", &self.presence_sweep)
            .field("instance_name", &self.instance_name)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        match var("JWT_SECRET") {
            Some(secret) if !secret.is_empty() => config.jwt_secret = secret,
            _ => tracing::warn!("JWT_SECRET not set, using the development secret"),
        }

        if let Some(secs) = var("PRESENCE_TTL_SECS").and_then(|v| parse_secs(&v)) {
            config.presence_ttl = secs;
        }

        if let Some(secs) = var("PRESENCE_SWEEP_SECS").and_then(|v| parse_secs(&v)) {
            config.presence_sweep = secs;
        }

        if let Some(name) = var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(val) = var("MAX_CONNECTIONS") {
            match val.trim().parse::<usize>() {
                Ok(n) => config.max_connections = n,
                Err(_) => tracing::warn!(value = %val, "Invalid MAX_CONNECTIONS, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

/// Whole seconds, strictly positive.
fn parse_secs(raw: &str) -> Option<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            tracing::warn!(value = %raw, "Ignoring invalid duration");
            None
        }
        Ok(n) => Some(Duration::from_secs(n)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.presence_ttl, Duration::from_secs(60));
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.max_connections, 0);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/relay.db"),
            ("JWT_SECRET", "s3cret"),
            ("PRESENCE_TTL_SECS", "15"),
            ("MAX_CONNECTIONS", "100"),
        ]));
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/tmp/relay.db"));
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.presence_ttl, Duration::from_secs(15));
        assert_eq!(config.max_connections, 100);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "nowhere"),
            ("PRESENCE_TTL_SECS", "0"),
            ("PRESENCE_SWEEP_SECS", "soon"),
            ("MAX_CONNECTIONS", "lots"),
        ]));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.presence_ttl, Duration::from_secs(60));
        assert_eq!(config.presence_sweep, Duration::from_secs(30));
        assert_eq!(config.max_connections, 0);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ServerConfig::from_lookup(lookup(&[("JWT_SECRET", "hunter2")]));
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("<redacted>"));
    }
}
