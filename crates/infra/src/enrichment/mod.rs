//! ENS-name enrichment: the asynchronous half of the cache-aside pipeline.
//!
//! The single task kind `cache_ens_name` resolves a wallet address into a
//! human-readable name and writes the outcome into the cache, the empty
//! string when resolution fails or finds nothing (negative entry), so
//! repeated reads don't re-trigger the expensive lookup inside the TTL
//! window. Resolver failures never propagate: a lookup that can't complete
//! degrades to the negative entry.

pub mod http_resolver;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::Cache;
use crate::jobs::{Task, TaskHandler, TaskOutcome};

pub use http_resolver::HttpNameResolver;

/// Task kind handled by `CacheEnsNameHandler`.
pub const TASK_CACHE_ENS_NAME: &str = "cache_ens_name";

const ENS_NAME_CACHE_PREFIX: &str = "ens-name";

/// How long a resolved (or negative) name stays cached.
pub const ENS_NAME_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

pub fn ens_cache_key(wallet_address: &str) -> String {
    format!("{ENS_NAME_CACHE_PREFIX}:{wallet_address}")
}

/// Payload of a `cache_ens_name` task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEnsNamePayload {
    pub wallet_address: String,
}

/// Resolver failure. Always absorbed by the handler.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
    #[error("malformed resolver response: {0}")]
    Malformed(String),
}

/// External reverse-lookup from wallet address to display name.
/// Best-effort: may fail or time out; `Ok(None)` means "no name".
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve(&self, wallet_address: &str) -> Result<Option<String>, ResolveError>;
}

/// Handler for `cache_ens_name` tasks.
///
/// Idempotent under at-least-once delivery: re-running overwrites the same
/// cache key with the same or a refreshed value.
pub struct CacheEnsNameHandler {
    resolver: Arc<dyn NameResolver>,
    cache: Arc<dyn Cache>,
    resolve_timeout: Duration,
}

impl CacheEnsNameHandler {
    pub fn new(resolver: Arc<dyn NameResolver>, cache: Arc<dyn Cache>) -> Self {
        Self {
            resolver,
            cache,
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    /// Bound the resolver call so a stalled lookup cannot starve workers.
    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }
}

#[async_trait]
impl TaskHandler for CacheEnsNameHandler {
    async fn handle(&self, task: &Task) -> TaskOutcome {
        let payload: CacheEnsNamePayload = match serde_json::from_value(task.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => return TaskOutcome::Discard(format!("bad cache_ens_name payload: {e}")),
        };
        let wallet_address = payload.wallet_address.as_str();

        let resolved = tokio::time::timeout(
            self.resolve_timeout,
            self.resolver.resolve(wallet_address),
        )
        .await;

        let name = match resolved {
            Ok(Ok(Some(name))) => name,
            Ok(Ok(None)) => {
                info!(wallet_address, "no ens name found for address");
                String::new()
            }
            Ok(Err(e)) => {
                info!(wallet_address, error = %e, "could not resolve address into an ens name");
                String::new()
            }
            Err(_) => {
                info!(wallet_address, "ens name resolution timed out");
                String::new()
            }
        };

        if let Err(e) = self
            .cache
            .set(&ens_cache_key(wallet_address), &name, ENS_NAME_CACHE_TTL)
            .await
        {
            return TaskOutcome::Retry(format!("could not store ens name in cache: {e}"));
        }

        debug!(wallet_address, ens_name = %name, "cached ens name");
        TaskOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::cache::{CacheError, CacheLookup, InMemoryCache};

    const WALLET: &str = "0xaF98EE24f2B9cD08E61dDcC0b3aE1A222F518AB1";

    struct StaticResolver {
        name: Option<String>,
        calls: AtomicU32,
    }

    impl StaticResolver {
        fn returning(name: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                name: name.map(String::from),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl NameResolver for StaticResolver {
        async fn resolve(&self, _wallet_address: &str) -> Result<Option<String>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.name.clone())
        }
    }

    struct FailingResolver;

    #[async_trait]
    impl NameResolver for FailingResolver {
        async fn resolve(&self, _wallet_address: &str) -> Result<Option<String>, ResolveError> {
            Err(ResolveError::Unavailable("connection refused".into()))
        }
    }

    struct StalledResolver;

    #[async_trait]
    impl NameResolver for StalledResolver {
        async fn resolve(&self, _wallet_address: &str) -> Result<Option<String>, ResolveError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl Cache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<CacheLookup, CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Connection("down".into()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Connection("down".into()))
        }
    }

    fn ens_task(wallet_address: &str) -> Task {
        Task::new(
            TASK_CACHE_ENS_NAME,
            serde_json::to_value(CacheEnsNamePayload {
                wallet_address: wallet_address.to_string(),
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn resolved_name_is_cached() {
        let cache = Arc::new(InMemoryCache::new());
        let handler =
            CacheEnsNameHandler::new(StaticResolver::returning(Some("player.eth")), cache.clone());

        let outcome = handler.handle(&ens_task(WALLET)).await;
        assert!(matches!(outcome, TaskOutcome::Success));
        assert_eq!(
            cache.get(&ens_cache_key(WALLET)).await.unwrap(),
            CacheLookup::Value("player.eth".into())
        );
    }

    #[tokio::test]
    async fn no_name_found_caches_a_negative_entry() {
        let cache = Arc::new(InMemoryCache::new());
        let resolver = StaticResolver::returning(None);
        let handler = CacheEnsNameHandler::new(resolver.clone(), cache.clone());

        let outcome = handler.handle(&ens_task(WALLET)).await;
        assert!(matches!(outcome, TaskOutcome::Success));

        // The negative entry is a hit, not a miss.
        assert_eq!(
            cache.get(&ens_cache_key(WALLET)).await.unwrap(),
            CacheLookup::Empty
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_is_idempotent() {
        let cache = Arc::new(InMemoryCache::new());
        let handler =
            CacheEnsNameHandler::new(StaticResolver::returning(Some("player.eth")), cache.clone());

        handler.handle(&ens_task(WALLET)).await;
        let after_once = cache.get(&ens_cache_key(WALLET)).await.unwrap();

        handler.handle(&ens_task(WALLET)).await;
        let after_twice = cache.get(&ens_cache_key(WALLET)).await.unwrap();

        assert_eq!(after_once, after_twice);
    }

    #[tokio::test]
    async fn resolver_failure_degrades_to_negative_entry() {
        let cache = Arc::new(InMemoryCache::new());
        let handler = CacheEnsNameHandler::new(Arc::new(FailingResolver), cache.clone());

        let outcome = handler.handle(&ens_task(WALLET)).await;
        assert!(matches!(outcome, TaskOutcome::Success));
        assert_eq!(
            cache.get(&ens_cache_key(WALLET)).await.unwrap(),
            CacheLookup::Empty
        );
    }

    #[tokio::test]
    async fn stalled_resolver_is_cut_off_by_the_timeout() {
        let cache = Arc::new(InMemoryCache::new());
        let handler = CacheEnsNameHandler::new(Arc::new(StalledResolver), cache.clone())
            .with_resolve_timeout(Duration::from_millis(20));

        let outcome = handler.handle(&ens_task(WALLET)).await;
        assert!(matches!(outcome, TaskOutcome::Success));
        assert_eq!(
            cache.get(&ens_cache_key(WALLET)).await.unwrap(),
            CacheLookup::Empty
        );
    }

    #[tokio::test]
    async fn malformed_payload_is_discarded() {
        let cache = Arc::new(InMemoryCache::new());
        let handler =
            CacheEnsNameHandler::new(StaticResolver::returning(Some("player.eth")), cache);

        let task = Task::new(TASK_CACHE_ENS_NAME, serde_json::json!({"wallet": 42}));
        let outcome = handler.handle(&task).await;
        assert!(matches!(outcome, TaskOutcome::Discard(_)));
    }

    #[tokio::test]
    async fn cache_write_failure_is_retryable() {
        let handler = CacheEnsNameHandler::new(
            StaticResolver::returning(Some("player.eth")),
            Arc::new(BrokenCache),
        );

        let outcome = handler.handle(&ens_task(WALLET)).await;
        assert!(matches!(outcome, TaskOutcome::Retry(_)));
    }
}
