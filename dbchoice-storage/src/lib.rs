//! dbchoice Storage - store and cache abstractions
//!
//! Defines the [`ChoiceStore`] trait persistent backends implement, an
//! in-memory store for tests and single-process use, change notification,
//! and the [`cache`] layer the registry reads through.

pub mod cache;
pub mod events;
pub mod memory;

pub use cache::{CacheBackend, CacheStats, InMemoryCache, LmdbCacheBackend, LmdbCacheError};
pub use events::{ChangeKind, ChangeListener, ChangeNotifier, ChoiceChange};
pub use memory::InMemoryChoiceStore;

use async_trait::async_trait;
use dbchoice_core::{
    ChoiceFilters, ChoiceId, ChoiceRecord, ChoiceUpdate, DbChoiceResult, NewChoice,
};
use std::sync::Arc;

/// Rows to delete: any of `group_names`, narrowed by `filters`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteSpec {
    pub group_names: Vec<String>,
    pub filters: ChoiceFilters,
}

impl DeleteSpec {
    pub fn new(group_names: Vec<String>, filters: ChoiceFilters) -> Self {
        Self {
            group_names,
            filters,
        }
    }
}

/// Deletes followed by creates, applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoiceBatch {
    pub deletes: Vec<DeleteSpec>,
    pub creates: Vec<NewChoice>,
    pub ignore_conflicts: bool,
}

/// Result of a committed [`ChoiceBatch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub deleted: u64,
    pub created: Vec<ChoiceRecord>,
}

/// Persistent table of choice rows.
///
/// `(group_name, value)` is unique across all rows. Reads return rows sorted
/// by `(ordering, label)`. Only the single-row operations notify subscribed
/// [`ChangeListener`]s; bulk operations are silent.
#[async_trait]
pub trait ChoiceStore: Send + Sync {
    // ========================================================================
    // BULK OPERATIONS
    // ========================================================================

    /// Rows of `group_name` matching every filter.
    async fn query(
        &self,
        group_name: &str,
        filters: &ChoiceFilters,
    ) -> DbChoiceResult<Vec<ChoiceRecord>>;

    /// Insert `records`.
    ///
    /// With `ignore_conflicts`, rows violating uniqueness are skipped and
    /// missing from the result. Without it, any conflict fails the whole call
    /// and nothing is inserted.
    async fn bulk_create(
        &self,
        records: Vec<NewChoice>,
        ignore_conflicts: bool,
    ) -> DbChoiceResult<Vec<ChoiceRecord>>;

    /// Delete rows in any of `group_names` matching every filter.
    async fn bulk_delete(
        &self,
        group_names: &[String],
        filters: &ChoiceFilters,
    ) -> DbChoiceResult<u64>;

    /// Apply all deletes, then all creates, in one transaction.
    async fn apply_batch(&self, batch: ChoiceBatch) -> DbChoiceResult<BatchOutcome>;

    // ========================================================================
    // SINGLE-ROW OPERATIONS
    // ========================================================================

    async fn create(&self, choice: NewChoice) -> DbChoiceResult<ChoiceRecord>;

    async fn get(&self, id: ChoiceId) -> DbChoiceResult<Option<ChoiceRecord>>;

    /// Edit a row. System default rows reject value changes.
    async fn update(&self, id: ChoiceId, update: ChoiceUpdate) -> DbChoiceResult<ChoiceRecord>;

    async fn delete(&self, id: ChoiceId) -> DbChoiceResult<()>;

    // ========================================================================
    // NOTIFICATION / HEALTH
    // ========================================================================

    /// Register a listener for single-row writes.
    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> DbChoiceResult<()>;

    async fn health_check(&self) -> DbChoiceResult<()>;
}
