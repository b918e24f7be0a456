//! Cache invalidation on single-row store writes.

use crate::ChoiceRegistry;
use async_trait::async_trait;
use dbchoice_core::{ChoiceFilters, DbChoiceResult};
use dbchoice_storage::{CacheBackend, ChangeListener, ChoiceChange, ChoiceStore};
use std::sync::{Arc, Weak};

/// Store listener that purges the unfiltered cache entry of a group whenever
/// one of its rows is created, updated, or deleted.
///
/// Holds the registry weakly so subscribing does not keep it alive.
/// Filtered entries are not purged; they expire with their TTL.
pub struct InvalidationHook<S: ?Sized, C: ?Sized> {
    registry: Weak<ChoiceRegistry<S, C>>,
}

impl<S, C> InvalidationHook<S, C>
where
    S: ChoiceStore + ?Sized + 'static,
    C: CacheBackend + ?Sized + 'static,
{
    pub fn new(registry: &Arc<ChoiceRegistry<S, C>>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }

    /// Create a hook for `registry` and subscribe it to the registry's store.
    pub fn attach(registry: &Arc<ChoiceRegistry<S, C>>) -> DbChoiceResult<Arc<Self>> {
        let hook = Arc::new(Self::new(registry));
        registry.store().subscribe(hook.clone())?;
        Ok(hook)
    }
}

#[async_trait]
impl<S, C> ChangeListener for InvalidationHook<S, C>
where
    S: ChoiceStore + ?Sized + 'static,
    C: CacheBackend + ?Sized + 'static,
{
    async fn on_change(&self, change: &ChoiceChange) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        if let Err(e) = registry
            .invalidate_cache(&change.group_name, &ChoiceFilters::new())
            .await
        {
            tracing::warn!(
                group_name = %change.group_name,
                kind = ?change.kind,
                error = %e,
                "failed to invalidate choice cache after write"
            );
        }
    }
}
