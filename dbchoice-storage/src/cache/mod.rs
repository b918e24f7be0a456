//! Key-value cache for resolved choice lists.
//!
//! The registry addresses entries with keys built by
//! [`dbchoice_core::generate_cache_key`] and stores `(value, label)` lists
//! with a TTL. Two backends ship: [`InMemoryCache`] for tests and
//! single-process deployments, and [`LmdbCacheBackend`] for a persistent,
//! memory-mapped cache shared across restarts.

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCache;
pub use traits::{CacheBackend, CacheStats};
