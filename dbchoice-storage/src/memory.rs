//! In-memory choice store.

use crate::events::{ChangeKind, ChangeListener, ChangeNotifier, ChoiceChange};
use crate::{BatchOutcome, ChoiceBatch, ChoiceStore};
use async_trait::async_trait;
use dbchoice_core::{
    sort_for_display, ChoiceFilters, ChoiceId, ChoiceRecord, ChoiceUpdate, DbChoiceResult,
    FieldMatch, NewChoice, StoreError,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// In-memory [`ChoiceStore`] for tests and single-process deployments.
///
/// Every write happens under one write lock, so batches are atomic. Counts
/// `query` calls so callers can assert on cache effectiveness, and can be
/// switched offline to exercise outage paths.
#[derive(Debug)]
pub struct InMemoryChoiceStore {
    rows: RwLock<Vec<ChoiceRecord>>,
    notifier: ChangeNotifier,
    query_count: AtomicU64,
    available: AtomicBool,
}

impl Default for InMemoryChoiceStore {
    fn default() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            notifier: ChangeNotifier::new(),
            query_count: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryChoiceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `query` calls served so far.
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::SeqCst)
    }

    pub fn reset_query_count(&self) {
        self.query_count.store(0, Ordering::SeqCst);
    }

    /// Simulate an outage: every operation fails with `Unavailable` while false.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Total row count across all groups.
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every row without notifying listeners.
    pub fn clear(&self) -> DbChoiceResult<()> {
        self.rows.write().map_err(|_| StoreError::LockPoisoned)?.clear();
        Ok(())
    }

    fn ensure_available(&self) -> DbChoiceResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable {
                reason: "in-memory store switched offline".to_string(),
            }
            .into())
        }
    }
}

fn conflicts(rows: &[ChoiceRecord], group_name: &str, value: &str, except: Option<ChoiceId>) -> bool {
    rows.iter()
        .any(|r| r.group_name == group_name && r.value == value && Some(r.id) != except)
}

fn insert_all(
    rows: &mut Vec<ChoiceRecord>,
    records: Vec<NewChoice>,
    ignore_conflicts: bool,
) -> DbChoiceResult<Vec<ChoiceRecord>> {
    let mut created = Vec::with_capacity(records.len());
    for choice in records {
        choice.validate()?;
        if conflicts(rows, &choice.group_name, &choice.value, None) {
            if ignore_conflicts {
                continue;
            }
            return Err(StoreError::UniqueViolation {
                group_name: choice.group_name,
                value: choice.value,
            }
            .into());
        }
        let record = choice.into_record();
        rows.push(record.clone());
        created.push(record);
    }
    Ok(created)
}

fn delete_matching(rows: &mut Vec<ChoiceRecord>, group_names: &[String], matches: &[FieldMatch]) -> u64 {
    let before = rows.len();
    rows.retain(|r| {
        !(group_names.iter().any(|g| *g == r.group_name) && matches.iter().all(|m| m.matches(r)))
    });
    (before - rows.len()) as u64
}

#[async_trait]
impl ChoiceStore for InMemoryChoiceStore {
    async fn query(
        &self,
        group_name: &str,
        filters: &ChoiceFilters,
    ) -> DbChoiceResult<Vec<ChoiceRecord>> {
        self.ensure_available()?;
        let matches = filters.resolve()?;
        self.query_count.fetch_add(1, Ordering::SeqCst);

        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut found: Vec<ChoiceRecord> = rows
            .iter()
            .filter(|r| r.group_name == group_name && matches.iter().all(|m| m.matches(r)))
            .cloned()
            .collect();
        sort_for_display(&mut found);
        Ok(found)
    }

    async fn bulk_create(
        &self,
        records: Vec<NewChoice>,
        ignore_conflicts: bool,
    ) -> DbChoiceResult<Vec<ChoiceRecord>> {
        self.ensure_available()?;
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;

        let mut working = rows.clone();
        let created = insert_all(&mut working, records, ignore_conflicts)?;
        *rows = working;
        Ok(created)
    }

    async fn bulk_delete(
        &self,
        group_names: &[String],
        filters: &ChoiceFilters,
    ) -> DbChoiceResult<u64> {
        self.ensure_available()?;
        let matches = filters.resolve()?;
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(delete_matching(&mut rows, group_names, &matches))
    }

    async fn apply_batch(&self, batch: ChoiceBatch) -> DbChoiceResult<BatchOutcome> {
        self.ensure_available()?;
        let deletes = batch
            .deletes
            .iter()
            .map(|spec| -> DbChoiceResult<_> {
                Ok((spec.group_names.as_slice(), spec.filters.resolve()?))
            })
            .collect::<DbChoiceResult<Vec<_>>>()?;

        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut working = rows.clone();

        let mut deleted = 0;
        for (group_names, matches) in &deletes {
            deleted += delete_matching(&mut working, group_names, matches);
        }
        let created = insert_all(&mut working, batch.creates, batch.ignore_conflicts)?;

        *rows = working;
        Ok(BatchOutcome { deleted, created })
    }

    async fn create(&self, choice: NewChoice) -> DbChoiceResult<ChoiceRecord> {
        self.ensure_available()?;
        let record = {
            let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
            let mut created = insert_all(&mut rows, vec![choice], false)?;
            created.pop().ok_or_else(|| StoreError::TransactionFailed {
                reason: "insert produced no row".to_string(),
            })?
        };

        self.notifier
            .notify(ChoiceChange::new(ChangeKind::Created, &record))
            .await;
        Ok(record)
    }

    async fn get(&self, id: ChoiceId) -> DbChoiceResult<Option<ChoiceRecord>> {
        self.ensure_available()?;
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.iter().find(|r| r.id == id).cloned())
    }

    async fn update(&self, id: ChoiceId, update: ChoiceUpdate) -> DbChoiceResult<ChoiceRecord> {
        self.ensure_available()?;
        let record = {
            let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
            let position = rows
                .iter()
                .position(|r| r.id == id)
                .ok_or(StoreError::NotFound { id })?;

            let mut edited = rows[position].clone();
            edited.apply_update(update)?;
            if conflicts(&rows, &edited.group_name, &edited.value, Some(id)) {
                return Err(StoreError::UniqueViolation {
                    group_name: edited.group_name,
                    value: edited.value,
                }
                .into());
            }
            rows[position] = edited.clone();
            edited
        };

        self.notifier
            .notify(ChoiceChange::new(ChangeKind::Updated, &record))
            .await;
        Ok(record)
    }

    async fn delete(&self, id: ChoiceId) -> DbChoiceResult<()> {
        self.ensure_available()?;
        let record = {
            let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
            let position = rows
                .iter()
                .position(|r| r.id == id)
                .ok_or(StoreError::NotFound { id })?;
            rows.remove(position)
        };

        self.notifier
            .notify(ChoiceChange::new(ChangeKind::Deleted, &record))
            .await;
        Ok(())
    }

    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> DbChoiceResult<()> {
        self.notifier.subscribe(listener)
    }

    async fn health_check(&self) -> DbChoiceResult<()> {
        self.ensure_available()
    }
}

// =============================================================================
// TESTS
// =============================================================================
