//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store for cached choice lists that survives process restarts.
//!
//! # Entry Format
//!
//! `[expires_at: 8 bytes, i64 millis LE][json choice list]`. Entries past
//! their expiry are deleted on read and reported as misses.

use std::borrow::Cow;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dbchoice_core::{CacheError, Choice, DbChoiceError, DbChoiceResult};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use sha2::{Digest, Sha256};

use super::traits::{CacheBackend, CacheStats};

const HEADER_LEN: usize = 8;
const DIGEST_KEY_PREFIX: &str = "sha256:";

/// Failures of the LMDB cache, folded into [`CacheError`] at the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    #[error("Cannot open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("Cannot open choice cache database: {0}")]
    DbOpen(String),

    #[error("LMDB transaction failed: {0}")]
    Transaction(String),

    #[error("Cannot encode choice list: {0}")]
    Serialization(String),

    /// Stored bytes that are not a valid entry.
    #[error("Corrupt cache entry: {0}")]
    Deserialization(String),

    #[error("Cache directory I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for DbChoiceError {
    fn from(e: LmdbCacheError) -> Self {
        let cache = match e {
            LmdbCacheError::Serialization(reason) | LmdbCacheError::Deserialization(reason) => {
                CacheError::Serialization { reason }
            }
            LmdbCacheError::EnvOpen(reason) => CacheError::Unavailable { reason },
            other => CacheError::Backend {
                reason: other.to_string(),
            },
        };
        DbChoiceError::Cache(cache)
    }
}

/// LMDB-backed choice list cache.
///
/// # Example
///
/// ```ignore
/// use dbchoice_storage::cache::{CacheBackend, LmdbCacheBackend};
/// use std::time::Duration;
///
/// let backend = LmdbCacheBackend::new("/tmp/dbchoice-cache", 64)?;
/// backend.set("dbchoice:ticket_status", &choices, Duration::from_secs(3600)).await?;
/// let cached = backend.get("dbchoice:ticket_status").await?;
/// ```
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    max_key_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl LmdbCacheBackend {
    /// Open (or create) the cache under the directory `path`, mapping at
    /// most `max_size_mb` megabytes.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let max_key_size = env.max_key_size();

        Ok(Self {
            env,
            db,
            max_key_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        })
    }

    /// Keys longer than LMDB accepts are stored under their SHA-256 digest.
    fn storage_key<'k>(&self, key: &'k str) -> Cow<'k, [u8]> {
        if key.len() <= self.max_key_size {
            Cow::Borrowed(key.as_bytes())
        } else {
            let digest = hex::encode(Sha256::digest(key.as_bytes()));
            Cow::Owned(format!("{}{}", DIGEST_KEY_PREFIX, digest).into_bytes())
        }
    }

    fn encode(choices: &[Choice], ttl: Duration) -> Result<Vec<u8>, LmdbCacheError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
        let payload =
            serde_json::to_vec(choices).map_err(|e| LmdbCacheError::Serialization(e.to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
        bytes.extend_from_slice(&expires_at.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    /// Returns `None` when the entry has expired.
    fn decode(bytes: &[u8]) -> Result<Option<Vec<Choice>>, LmdbCacheError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbCacheError::Deserialization("truncated entry".into()));
        }
        let header: [u8; HEADER_LEN] = bytes[..HEADER_LEN]
            .try_into()
            .map_err(|_| LmdbCacheError::Deserialization("invalid expiry".into()))?;
        if i64::from_le_bytes(header) <= Utc::now().timestamp_millis() {
            return Ok(None);
        }

        let choices = serde_json::from_slice(&bytes[HEADER_LEN..])
            .map_err(|e| LmdbCacheError::Deserialization(e.to_string()))?;
        Ok(Some(choices))
    }

    fn remove(&self, key: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        Ok(deleted)
    }

    fn entry_count(&self) -> Result<u64, LmdbCacheError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))
    }
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &str) -> DbChoiceResult<Option<Vec<Choice>>> {
        let decoded = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
            match self.db.get(&rtxn, &self.storage_key(key)) {
                Ok(Some(bytes)) => Some(Self::decode(bytes)?),
                Ok(None) => None,
                Err(e) => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return Err(LmdbCacheError::Transaction(e.to_string()).into());
                }
            }
        };

        match decoded {
            Some(Some(choices)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(choices))
            }
            Some(None) => {
                self.remove(&self.storage_key(key))?;
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
        let bytes = Self::encode(choices, ttl)?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .put(&mut wtxn, &self.storage_key(key), &bytes)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> DbChoiceResult<bool> {
        Ok(self.remove(&self.storage_key(key))?)
    }

    async fn clear(&self) -> DbChoiceResult<u64> {
        let count = self.entry_count()?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        self.db
            .clear(&mut wtxn)
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(count)
    }

    async fn stats(&self) -> DbChoiceResult<CacheStats> {
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: self.entry_count()?,
            expirations: self.expirations.load(Ordering::Relaxed),
        })
    }
}
