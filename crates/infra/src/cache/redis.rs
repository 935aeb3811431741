//! Redis-backed cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{Cache, CacheError, CacheLookup};

/// Redis cache. Values are plain strings; a stored empty string is the
/// negative entry. Keys expire server-side via `SET ... EX`.
#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    /// Connect from a Redis URL (e.g. `redis://localhost:6379`).
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<CacheLookup, CacheError> {
        let mut conn = self.connection().await?;

        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;

        Ok(match value {
            Some(stored) => CacheLookup::from_stored(stored),
            None => CacheLookup::Miss,
        })
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;

        // SET with EX; sub-second TTLs round up to 1s.
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;

        let deleted: u64 = conn
            .del(key)
            .await
            .map_err(|e| CacheError::Command(e.to_string()))?;

        Ok(deleted > 0)
    }
}
