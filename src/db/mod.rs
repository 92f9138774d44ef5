//! Durable key/value layer mirrored by the tiered recommendation cache
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::AppResult;

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryBackingStore;
pub use self::redis::{create_redis_client, BackingWriterHandle, RedisBackingStore};

/// Expiry metadata accompanying a durable write.
///
/// Informational only: backing stores keep values past `ttl` so expired
/// entries stay available for stale fallback after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlMeta {
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
}

/// Simple durable key/value interface that survives process restarts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BackingStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    async fn set(&self, key: &str, value: String, meta: TtlMeta) -> AppResult<()>;

    /// Store name for logging
    fn name(&self) -> &'static str;
}
