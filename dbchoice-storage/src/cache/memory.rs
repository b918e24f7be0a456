//! In-process cache backend.

use super::traits::{CacheBackend, CacheStats};
use async_trait::async_trait;
use dbchoice_core::{CacheError, Choice, DbChoiceResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    choices: Vec<Choice>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// `HashMap`-backed cache with per-entry expiry.
///
/// Expired entries are dropped lazily on access. Can be switched offline to
/// exercise cache outage paths.
#[derive(Debug)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
    available: AtomicBool,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether a live entry exists for `key`, without touching statistics.
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .get(key)
                    .is_some_and(|e| e.is_live(Instant::now()))
            })
            .unwrap_or(false)
    }

    /// Keys of all stored entries, expired or not.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable {
                reason: "in-memory cache switched offline".to_string(),
            })
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> DbChoiceResult<Option<Vec<Choice>>> {
        self.ensure_available()?;
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;

        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.choices.clone()))
            }
            Some(_) => {
                entries.remove(key);
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, choices: &[Choice], ttl: Duration) -> DbChoiceResult<()> {
        self.ensure_available()?;
        let entry = Entry {
            choices: choices.to_vec(),
            expires_at: Instant::now().checked_add(ttl),
        };
        self.entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DbChoiceResult<bool> {
        self.ensure_available()?;
        let removed = self
            .entries
            .write()
            .map_err(|_| CacheError::LockPoisoned)?
            .remove(key);
        Ok(removed.is_some())
    }

    async fn clear(&self) -> DbChoiceResult<u64> {
        self.ensure_available()?;
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }

    async fn stats(&self) -> DbChoiceResult<CacheStats> {
        let entry_count = self
            .entries
            .read()
            .map_err(|_| CacheError::LockPoisoned)?
            .len() as u64;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbchoice_core::DbChoiceError;

    fn sample() -> Vec<Choice> {
        vec![Choice::new("open", "Open"), Choice::new("closed", "Closed")]
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", &sample(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(sample()));
        assert!(cache.contains("k"));

        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[tokio::test]
    async fn test_empty_list_is_a_hit() {
        let cache = InMemoryCache::new();
        cache.set("empty", &[], Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("empty").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = InMemoryCache::new();
        cache
            .set("k", &sample(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.entry_count, 0);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let cache = InMemoryCache::new();
        cache
            .set("k", &sample(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        assert!(cache.contains("k"));
        assert_eq!(cache.get("k").await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = InMemoryCache::new();
        cache.set("a", &sample(), Duration::from_secs(60)).await.unwrap();
        cache.set("b", &sample(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.keys().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let cache = InMemoryCache::new();
        cache.set_available(false);
        let err = cache.get("k").await.unwrap_err();
        assert!(matches!(
            err,
            DbChoiceError::Cache(CacheError::Unavailable { .. })
        ));
    }
}
