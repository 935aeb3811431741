//! Key/value cache with TTL and explicit negative entries.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use self::memory::InMemoryCache;
pub use self::redis::RedisCache;

/// Result of a cache read.
///
/// `Empty` (a stored empty string) means "resolved, nothing found" and is a
/// hit; `Miss` means "never resolved". Collapsing the two is what triggers
/// redundant upstream lookups, so they stay separate states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Entry present with a non-empty value.
    Value(String),
    /// Entry present, negative: resolution ran and found nothing.
    Empty,
    /// No entry.
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        !matches!(self, CacheLookup::Miss)
    }

    /// The cached string for either hit state (`Empty` yields "").
    pub fn into_hit_value(self) -> Option<String> {
        match self {
            CacheLookup::Value(v) => Some(v),
            CacheLookup::Empty => Some(String::new()),
            CacheLookup::Miss => None,
        }
    }

    pub(crate) fn from_stored(value: String) -> Self {
        if value.is_empty() {
            CacheLookup::Empty
        } else {
            CacheLookup::Value(value)
        }
    }
}

/// Cache error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),
    #[error("cache command error: {0}")]
    Command(String),
}

/// Key/value cache, safely shareable across request handlers and workers.
/// Per-key concurrency control is the backing store's concern.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<CacheLookup, CacheError>;

    /// Store `value` (the empty string is a valid negative entry) with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Delete a key. Returns whether an entry existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_states_are_distinct() {
        assert!(CacheLookup::Value("vitalik.eth".into()).is_hit());
        assert!(CacheLookup::Empty.is_hit());
        assert!(!CacheLookup::Miss.is_hit());

        assert_eq!(
            CacheLookup::Value("vitalik.eth".into()).into_hit_value(),
            Some("vitalik.eth".to_string())
        );
        assert_eq!(CacheLookup::Empty.into_hit_value(), Some(String::new()));
        assert_eq!(CacheLookup::Miss.into_hit_value(), None);
    }

    #[test]
    fn stored_empty_string_is_a_negative_hit() {
        assert_eq!(CacheLookup::from_stored(String::new()), CacheLookup::Empty);
        assert_eq!(
            CacheLookup::from_stored("abc".into()),
            CacheLookup::Value("abc".into())
        );
    }
}
