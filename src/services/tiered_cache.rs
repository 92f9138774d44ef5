use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::db::{BackingStore, TtlMeta};
use crate::models::RecommendationSet;
use crate::services::cache_key::RequestKey;

/// Cache level an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    /// Short-lived entries written by user-initiated generations
    Hot,
    /// Longer-lived entries written only by scheduled refreshes
    Background,
}

impl Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTier::Hot => write!(f, "hot"),
            CacheTier::Background => write!(f, "background"),
        }
    }
}

/// A cached recommendation set.
///
/// Entries are never purged: once past `ttl` they stop counting as hits but
/// remain available as stale fallback until a newer write replaces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: RecommendationSet,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    pub tier: CacheTier,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Fresh iff `now - created_at < ttl`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.age(now) < self.ttl
    }
}

fn storage_key(key: &RequestKey, tier: CacheTier) -> String {
    match tier {
        CacheTier::Hot => key.to_string(),
        CacheTier::Background => key.background(),
    }
}

/// Two-tier recommendation cache held in process and mirrored to a backing store
pub struct TieredCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    backing: Arc<dyn BackingStore>,
    clock: Arc<dyn Clock>,
}

impl TieredCacheStore {
    pub fn new(backing: Arc<dyn BackingStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            backing,
            clock,
        }
    }

    /// Returns the entry for `key` in `tier` if it is still fresh.
    ///
    /// Expired entries are reported as a miss here; use
    /// [`get_stale_fallback`](Self::get_stale_fallback) to reach them.
    pub async fn get(&self, key: &RequestKey, tier: CacheTier) -> Option<CacheEntry> {
        let entry = self.peek(key, tier).await?;
        let now = self.clock.now();

        if entry.is_fresh(now) {
            tracing::debug!(key = %key, tier = %tier, age_secs = entry.age(now).as_secs(), "Cache hit");
            Some(entry)
        } else {
            tracing::debug!(key = %key, tier = %tier, age_secs = entry.age(now).as_secs(), "Cache entry expired");
            None
        }
    }

    /// Most recent entry regardless of TTL, Hot tier first, then Background
    pub async fn get_stale_fallback(&self, key: &RequestKey) -> Option<CacheEntry> {
        if let Some(entry) = self.peek(key, CacheTier::Hot).await {
            return Some(entry);
        }
        self.peek(key, CacheTier::Background).await
    }

    /// Writes `payload` stamped with the current time
    pub async fn set(
        &self,
        key: &RequestKey,
        payload: RecommendationSet,
        tier: CacheTier,
        ttl: Duration,
    ) -> bool {
        let now = self.clock.now();
        self.set_at(key, payload, tier, ttl, now).await
    }

    /// Writes `payload` stamped with `created_at`.
    ///
    /// Last write wins by timestamp: a write older than the entry already
    /// stored for the same key and tier is rejected and `false` is returned.
    pub async fn set_at(
        &self,
        key: &RequestKey,
        payload: RecommendationSet,
        tier: CacheTier,
        ttl: Duration,
        created_at: DateTime<Utc>,
    ) -> bool {
        let storage_key = storage_key(key, tier);
        let mut entries = self.entries.write().await;

        if let Some(existing) = entries.get(&storage_key) {
            if created_at < existing.created_at {
                tracing::warn!(
                    key = %key,
                    tier = %tier,
                    existing = %existing.created_at,
                    rejected = %created_at,
                    "Rejected cache write older than stored entry"
                );
                return false;
            }
        }

        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            created_at,
            ttl,
            tier,
        };

        match serde_json::to_string(&entry) {
            Ok(json) => {
                let meta = TtlMeta { created_at, ttl };
                if let Err(e) = self.backing.set(&storage_key, json, meta).await {
                    tracing::warn!(
                        error = %e,
                        key = %key,
                        backing = self.backing.name(),
                        "Failed to mirror cache entry"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "Cache serialization error"),
        }

        entries.insert(storage_key, entry);
        tracing::debug!(key = %key, tier = %tier, ttl_secs = ttl.as_secs(), "Cache entry written");
        true
    }

    /// Number of entries held in process, fresh or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Entry in `tier` regardless of freshness, loading it from the backing store
    /// when this process has not seen it yet.
    async fn peek(&self, key: &RequestKey, tier: CacheTier) -> Option<CacheEntry> {
        let storage_key = storage_key(key, tier);

        if let Some(entry) = self.entries.read().await.get(&storage_key) {
            return Some(entry.clone());
        }

        let json = match self.backing.get(&storage_key).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    key = %key,
                    backing = self.backing.name(),
                    "Backing store read failed, treating as miss"
                );
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&json) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Discarding undecodable backing entry");
                return None;
            }
        };

        tracing::debug!(key = %key, tier = %tier, "Hydrated cache entry from backing store");

        let mut entries = self.entries.write().await;
        let stored = entries
            .entry(storage_key)
            .and_modify(|existing| {
                if entry.created_at > existing.created_at {
                    *existing = entry.clone();
                }
            })
            .or_insert_with(|| entry.clone());
        Some(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::{InMemoryBackingStore, MockBackingStore};
    use crate::error::AppError;
    use crate::models::{RecommendationFilters, Suggestion};
    use crate::services::cache_key::derive_key;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn set_with(title: &str) -> RecommendationSet {
        RecommendationSet::new(
            vec![Suggestion {
                title: title.to_string(),
                external_id: None,
                reason: "because".to_string(),
            }],
            vec![],
        )
    }

    fn key() -> RequestKey {
        derive_key("u1", &RecommendationFilters::new())
    }

    fn store_with_clock() -> (TieredCacheStore, Arc<ManualClock>, Arc<InMemoryBackingStore>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backing = Arc::new(InMemoryBackingStore::new());
        let store = TieredCacheStore::new(backing.clone(), clock.clone());
        (store, clock, backing)
    }

    #[tokio::test]
    async fn test_miss_when_empty() {
        let (store, _, _) = store_with_clock();
        assert!(store.get(&key(), CacheTier::Hot).await.is_none());
        assert!(store.get_stale_fallback(&key()).await.is_none());
    }

    #[tokio::test]
    async fn test_ttl_expiry_keeps_entry_for_fallback() {
        let (store, clock, _) = store_with_clock();
        store.set(&key(), set_with("Heat"), CacheTier::Hot, HOUR).await;

        clock.advance(Duration::from_secs(59 * 60));
        assert!(store.get(&key(), CacheTier::Hot).await.is_some());

        clock.advance(Duration::from_secs(2 * 60));
        assert!(store.get(&key(), CacheTier::Hot).await.is_none());

        let stale = store.get_stale_fallback(&key()).await.unwrap();
        assert_eq!(stale.payload.movies[0].title, "Heat");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_tiers_are_separate() {
        let (store, _, backing) = store_with_clock();
        store
            .set(&key(), set_with("Ronin"), CacheTier::Background, 2 * HOUR)
            .await;

        assert!(store.get(&key(), CacheTier::Hot).await.is_none());
        assert!(store.get(&key(), CacheTier::Background).await.is_some());
        assert!(backing.get(&key().background()).await.unwrap().is_some());
        assert!(backing.get(key().as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_fallback_prefers_hot_tier() {
        let (store, clock, _) = store_with_clock();
        store.set(&key(), set_with("Hot"), CacheTier::Hot, HOUR).await;
        clock.advance(Duration::from_secs(10));
        store
            .set(&key(), set_with("Background"), CacheTier::Background, 2 * HOUR)
            .await;

        let fallback = store.get_stale_fallback(&key()).await.unwrap();
        assert_eq!(fallback.tier, CacheTier::Hot);
    }

    #[tokio::test]
    async fn test_stale_fallback_uses_background_when_no_hot() {
        let (store, _, _) = store_with_clock();
        store
            .set(&key(), set_with("Background"), CacheTier::Background, 2 * HOUR)
            .await;

        let fallback = store.get_stale_fallback(&key()).await.unwrap();
        assert_eq!(fallback.tier, CacheTier::Background);
    }

    #[tokio::test]
    async fn test_older_write_is_rejected() {
        let (store, clock, _) = store_with_clock();
        let slow_started = clock.now();
        clock.advance(Duration::from_secs(30));

        assert!(store.set(&key(), set_with("Fresh"), CacheTier::Hot, HOUR).await);
        let accepted = store
            .set_at(&key(), set_with("Slow"), CacheTier::Hot, HOUR, slow_started)
            .await;

        assert!(!accepted);
        let entry = store.get(&key(), CacheTier::Hot).await.unwrap();
        assert_eq!(entry.payload.movies[0].title, "Fresh");
    }

    #[tokio::test]
    async fn test_entries_survive_restart_through_backing_store() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backing = Arc::new(InMemoryBackingStore::new());

        let first = TieredCacheStore::new(backing.clone(), clock.clone());
        first.set(&key(), set_with("Persisted"), CacheTier::Hot, HOUR).await;
        drop(first);

        let restarted = TieredCacheStore::new(backing, clock);
        let entry = restarted.get(&key(), CacheTier::Hot).await.unwrap();
        assert_eq!(entry.payload.movies[0].title, "Persisted");
        assert_eq!(restarted.len().await, 1);
    }

    #[tokio::test]
    async fn test_backing_failure_is_a_miss() {
        let mut backing = MockBackingStore::new();
        backing
            .expect_get()
            .returning(|_| Err(AppError::Internal("connection refused".to_string())));
        backing.expect_name().return_const("mock");

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = TieredCacheStore::new(Arc::new(backing), clock);

        assert!(store.get(&key(), CacheTier::Hot).await.is_none());
    }

    #[tokio::test]
    async fn test_backing_write_failure_keeps_process_copy() {
        let mut backing = MockBackingStore::new();
        backing
            .expect_set()
            .times(1)
            .returning(|_, _, _| Err(AppError::Internal("read only replica".to_string())));
        backing.expect_name().return_const("mock");

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = TieredCacheStore::new(Arc::new(backing), clock);

        assert!(store.set(&key(), set_with("Local"), CacheTier::Hot, HOUR).await);
        assert!(store.get(&key(), CacheTier::Hot).await.is_some());
    }

    #[test]
    fn test_entry_freshness_boundary() {
        let created_at = Utc::now();
        let entry = CacheEntry {
            key: "k".to_string(),
            payload: set_with("X"),
            created_at,
            ttl: HOUR,
            tier: CacheTier::Hot,
        };

        assert!(entry.is_fresh(created_at + chrono::Duration::minutes(59)));
        assert!(!entry.is_fresh(created_at + chrono::Duration::minutes(60)));
    }
}
