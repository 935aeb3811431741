//! In-memory TTL cache for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{Cache, CacheError, CacheLookup};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory cache with the same hit/empty/miss semantics as the Redis
/// implementation. Expiry is checked lazily on read.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<CacheLookup, CacheError> {
        let mut entries = self.entries.lock().unwrap();

        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                Ok(CacheLookup::from_stored(entry.value.clone()))
            }
            Some(_) => {
                entries.remove(key);
                Ok(CacheLookup::Miss)
            }
            None => Ok(CacheLookup::Miss),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().unwrap().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_distinguishes_value_empty_and_miss() {
        let cache = InMemoryCache::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.get("a").await.unwrap(), CacheLookup::Miss);

        cache.set("a", "vitalik.eth", ttl).await.unwrap();
        assert_eq!(
            cache.get("a").await.unwrap(),
            CacheLookup::Value("vitalik.eth".into())
        );

        cache.set("a", "", ttl).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), CacheLookup::Empty);
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss() {
        let cache = InMemoryCache::new();

        cache.set("a", "value", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert_eq!(cache.get("a").await.unwrap(), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let cache = InMemoryCache::new();

        cache.set("a", "value", Duration::from_secs(60)).await.unwrap();
        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());
        assert_eq!(cache.get("a").await.unwrap(), CacheLookup::Miss);
    }
}
