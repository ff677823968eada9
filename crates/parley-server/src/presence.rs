//! Best-effort online presence.
//!
//! A user is online while their marker has not expired. Markers are armed by
//! [`PresenceStore::mark_online`] and re-armed by heartbeats; nothing is
//! pushed when one lapses. Every arm or re-arm also persists a last-seen
//! timestamp, which does not expire.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use parley_shared::UserId;
use parley_store::StoreError;

use crate::store::Store;

#[derive(Clone)]
pub struct PresenceStore {
    ttl: Duration,
    /// user -> instant at which the online marker lapses
    online: Arc<RwLock<HashMap<UserId, Instant>>>,
    store: Store,
}

impl PresenceStore {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self {
            ttl,
            online: Arc::new(RwLock::new(HashMap::new())),
            store,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn mark_online(&self, user: UserId) {
        self.arm(user).await;
        debug!(%user, "online");
    }

    /// Re-arm the marker. Works whether or not the user was online before.
    pub async fn refresh(&self, user: UserId) {
        self.arm(user).await;
    }

    /// Drop the marker immediately, e.g. on an explicit sign-out.
    #[allow(dead_code)]
    pub async fn clear(&self, user: UserId) {
        self.online.write().await.remove(&user);
        self.stamp_last_seen(user).await;
        debug!(%user, "presence cleared");
    }

    pub async fn is_online(&self, user: UserId) -> bool {
        self.online
            .read()
            .await
            .get(&user)
            .is_some_and(|expires| *expires > Instant::now())
    }

    pub async fn last_seen(&self, user: UserId) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.store.run(move |db| db.last_seen(user)).await
    }

    /// Forget lapsed markers. `is_online` already ignores them; this only
    /// bounds memory.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut online = self.online.write().await;
        let before = online.len();
        online.retain(|_, expires| *expires > now);
        before - online.len()
    }

    async fn arm(&self, user: UserId) {
        let expires = Instant::now() + self.ttl;
        self.online.write().await.insert(user, expires);
        self.stamp_last_seen(user).await;
    }

    async fn stamp_last_seen(&self, user: UserId) {
        let at = Utc::now().trunc_subsecs(6);
        if let Err(e) = self.store.run(move |db| db.touch_last_seen(user, at)).await {
            warn!(%user, error = %e, "failed to persist last-seen");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{add_user, memory_store};

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn online_until_ttl_lapses() {
        let store = memory_store();
        let alice = add_user(&store, "alice").await;
        let presence = PresenceStore::new(store, TTL);

        assert!(!presence.is_online(alice.id).await);
        presence.mark_online(alice.id).await;
        assert!(presence.is_online(alice.id).await);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(presence.is_online(alice.id).await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!presence.is_online(alice.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_extends_and_establishes() {
        let store = memory_store();
        let alice = add_user(&store, "alice").await;
        let bob = add_user(&store, "bob").await;
        let presence = PresenceStore::new(store, TTL);

        presence.mark_online(alice.id).await;
        tokio::time::advance(Duration::from_secs(45)).await;
        presence.refresh(alice.id).await;
        tokio::time::advance(Duration::from_secs(45)).await;
        assert!(presence.is_online(alice.id).await);

        // Refresh without a prior mark is not an error.
        presence.refresh(bob.id).await;
        assert!(presence.is_online(bob.id).await);
    }

    #[tokio::test]
    async fn clear_goes_offline_and_stamps_last_seen() {
        let store = memory_store();
        let alice = add_user(&store, "alice").await;
        let presence = PresenceStore::new(store, TTL);

        assert_eq!(presence.last_seen(alice.id).await.unwrap(), None);
        presence.mark_online(alice.id).await;
        let seen_online = presence.last_seen(alice.id).await.unwrap();
        assert!(seen_online.is_some());

        presence.clear(alice.id).await;
        assert!(!presence.is_online(alice.id).await);
        assert!(presence.last_seen(alice.id).await.unwrap() >= seen_online);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_lapsed_markers() {
        let store = memory_store();
        let alice = add_user(&store, "alice").await;
        let bob = add_user(&store, "bob").await;
        let presence = PresenceStore::new(store, TTL);

        presence.mark_online(alice.id).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        presence.mark_online(bob.id).await;
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(presence.purge_expired().await, 1);
        assert!(presence.is_online(bob.id).await);
    }
}
