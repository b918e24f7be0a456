//! Cache backend trait and statistics.

use async_trait::async_trait;
use dbchoice_core::{Choice, DbChoiceResult};
use std::time::Duration;

/// Cache backend trait for pluggable cache implementations.
///
/// Implementations must be thread-safe. An expired entry behaves exactly
/// like a missing one. Failures surface as
/// [`CacheError`](dbchoice_core::CacheError) inside the result.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the cached list for `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> DbChoiceResult<Option<Vec<Choice>>>;

    /// Store `choices` under `key` for `ttl`, replacing any existing entry.
    async fn set(&self, key: &str, choices: &[Choice], ttl: Duration) -> DbChoiceResult<()>;

    /// Remove `key`. Returns whether an entry was present.
    async fn delete(&self, key: &str) -> DbChoiceResult<bool>;

    /// Remove every entry. Returns how many were removed.
    async fn clear(&self) -> DbChoiceResult<u64>;

    /// Get cache statistics.
    async fn stats(&self) -> DbChoiceResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries dropped because their TTL elapsed.
    pub expirations: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
