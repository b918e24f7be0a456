//! Registry behavior against the in-memory and SQLite stores.

use async_trait::async_trait;
use dbchoice_core::{
    Choice, ChoiceFilters, ChoiceUpdate, DbChoiceError, DbChoiceResult, NewChoice,
    RegistryConfig, ValidationError,
};
use dbchoice_registry::{
    choice_enum, ChoiceRegistry, ChoiceValidator, InvalidationHook, SyncOptions,
};
use dbchoice_sqlite::SqliteChoiceStore;
use dbchoice_storage::{
    CacheBackend, CacheStats, ChoiceStore, InMemoryCache, InMemoryChoiceStore,
};
use dbchoice_test_utils::{assertions, fixtures, generators, init_test_tracing};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn none() -> ChoiceFilters {
    ChoiceFilters::new()
}

choice_enum! {
    pub enum TicketState {
        Open = "OPEN",
        Closed = "closed" => "Closed",
    }
}

choice_enum! {
    enum Priority {
        High = 1 => "High",
        Low = 2 => "Low",
    }
}

// ============================================================================
// SYNCHRONIZATION
// ============================================================================

#[tokio::test]
async fn test_ticket_status_scenario() {
    init_test_tracing();
    let registry = fixtures::memory_registry();
    registry
        .register_defaults(fixtures::TICKET_STATUS, fixtures::ticket_status_defaults())
        .unwrap();

    let report = registry.sync_defaults(SyncOptions::default()).await.unwrap();
    assert_eq!(report.created, 4);
    assert_eq!(report.deleted, 0);

    let rows = registry
        .store()
        .query(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert_eq!(rows.len(), 4);
    assertions::assert_display_order(&rows);
    for (index, row) in rows.iter().enumerate() {
        assert_eq!(row.ordering, index as i32);
        assert!(row.is_system_default);
    }
    assert_eq!(rows[1].name, "IN_PROGRESS");

    let choices = registry
        .get_choices(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert_eq!(choices, fixtures::ticket_status_choices());
}

#[tokio::test]
async fn test_sync_is_noop_without_registrations() {
    let registry = fixtures::memory_registry();
    let report = registry.sync_defaults(SyncOptions::default()).await.unwrap();
    assert_eq!(report.created, 0);
    assert!(registry.store().is_empty());
}

#[tokio::test]
async fn test_sync_restricted_to_groups() {
    let registry = fixtures::memory_registry();
    registry.register_defaults("a", vec![("X", "x", "X")]).unwrap();
    registry.register_defaults("b", vec![("Y", "y", "Y")]).unwrap();

    let report = registry
        .sync_defaults(SyncOptions::new().for_groups(["b", "never_registered"]))
        .await
        .unwrap();
    assert_eq!(report.groups, vec!["b"]);
    assert!(registry.store().query("a", &none()).await.unwrap().is_empty());
    assert_eq!(registry.store().query("b", &none()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_recreate_defaults_replaces_system_rows() {
    let registry = fixtures::memory_registry();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    let report = registry.sync_defaults(SyncOptions::default()).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.created, 1);
    assert_eq!(registry.store().len(), 1);
}

#[tokio::test]
async fn test_sync_without_recreate_skips_existing_values() {
    let registry = fixtures::memory_registry();
    registry
        .register_defaults(fixtures::TICKET_STATUS, fixtures::ticket_status_defaults())
        .unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();

    let report = registry
        .sync_defaults(SyncOptions::new().recreate_defaults(false))
        .await
        .unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(report.created, 0);
    assert_eq!(report.skipped, 4);
    assert_eq!(registry.store().len(), 5);
}

#[tokio::test]
async fn test_recreate_defaults_preserves_custom_rows() {
    let registry = fixtures::memory_registry();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    registry
        .store()
        .create(fixtures::custom_choice("g", "custom", "Custom"))
        .await
        .unwrap();

    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    let rows = registry.store().query("g", &none()).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.value == "custom" && !r.is_system_default));
}

#[tokio::test]
async fn test_recreate_all_drops_custom_rows() {
    let registry = fixtures::memory_registry();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    registry
        .store()
        .create(fixtures::custom_choice("g", "custom", "Custom"))
        .await
        .unwrap();

    let report = registry
        .sync_defaults(SyncOptions::new().recreate_all(true))
        .await
        .unwrap();
    assert_eq!(report.deleted, 2);

    let rows = registry.store().query("g", &none()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value, "a");
}

#[tokio::test]
async fn test_sync_keeps_custom_row_that_shadows_default() {
    let registry = fixtures::memory_registry();
    registry
        .store()
        .create(NewChoice::new("g", "a", "Custom A"))
        .await
        .unwrap();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();

    let report = registry.sync_defaults(SyncOptions::default()).await.unwrap();
    assert_eq!(report.skipped, 1);

    let label = registry.get_label("g", "a", &none()).await.unwrap();
    assert_eq!(label.as_deref(), Some("Custom A"));
}

#[tokio::test]
async fn test_sync_invalidates_unfiltered_entry() {
    let registry = fixtures::memory_registry();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    assert_eq!(registry.get_choices("g", &none()).await.unwrap().len(), 1);

    registry
        .register_defaults("g", vec![("A", "a", "A"), ("B", "b", "B")])
        .unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    assert_eq!(registry.get_choices("g", &none()).await.unwrap().len(), 2);
}

// ============================================================================
// READS AND CACHING
// ============================================================================

#[tokio::test]
async fn test_cache_hit_skips_store() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    registry.store().reset_query_count();

    let first = registry
        .get_choices(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    let second = registry
        .get_choices(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(registry.store().query_count(), 1);
}

#[tokio::test]
async fn test_unknown_group_is_empty_and_cached() {
    let registry = fixtures::memory_registry();
    assert!(registry.get_choices("missing", &none()).await.unwrap().is_empty());
    assert!(registry
        .cache()
        .contains(&registry.cache_key("missing", &none())));
}

#[tokio::test]
async fn test_group_names_are_case_sensitive() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    let upper = registry.get_choices("TICKET_STATUS", &none()).await.unwrap();
    assert!(upper.is_empty());
    assert_ne!(
        registry.cache_key("TICKET_STATUS", &none()),
        registry.cache_key(fixtures::TICKET_STATUS, &none())
    );
}

#[tokio::test]
async fn test_get_label() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    let label = registry
        .get_label(fixtures::TICKET_STATUS, "in_progress", &none())
        .await
        .unwrap();
    assert_eq!(label.as_deref(), Some("In Progress"));

    let missing = registry
        .get_label(fixtures::TICKET_STATUS, "bogus", &none())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_filtered_reads() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();

    let defaults_only = ChoiceFilters::new().with("is_system_default", true);
    let choices = registry
        .get_choices(fixtures::TICKET_STATUS, &defaults_only)
        .await
        .unwrap();
    assertions::assert_values(&choices, &["open", "in_progress", "resolved", "closed"]);
}

#[tokio::test]
async fn test_unknown_filter_field_propagates() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    let result = registry
        .get_choices(fixtures::TICKET_STATUS, &ChoiceFilters::new().with("colour", "red"))
        .await;
    assert!(matches!(result, Err(DbChoiceError::Query(_))));
}

#[tokio::test]
async fn test_store_unavailable_propagates() {
    let registry = fixtures::memory_registry();
    registry.store().set_available(false);
    let result = registry.get_choices("g", &none()).await;
    assert!(matches!(result, Err(DbChoiceError::Store(_))));
}

#[tokio::test]
async fn test_cache_unavailable_propagates() {
    let registry = fixtures::memory_registry();
    registry.cache().set_available(false);
    let result = registry.get_choices("g", &none()).await;
    assert!(matches!(result, Err(DbChoiceError::Cache(_))));
}

#[tokio::test]
async fn test_configured_namespace_and_ttl() {
    let registry = ChoiceRegistry::new(
        Arc::new(InMemoryChoiceStore::new()),
        Arc::new(InMemoryCache::new()),
        RegistryConfig::new()
            .with_namespace("tenant_a")
            .with_ttl(Duration::from_millis(20)),
    )
    .unwrap();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    registry.get_choices("g", &none()).await.unwrap();
    assert!(registry.cache().contains("tenant_a:g"));

    tokio::time::sleep(Duration::from_millis(40)).await;
    registry.store().reset_query_count();
    registry.get_choices("g", &none()).await.unwrap();
    assert_eq!(registry.store().query_count(), 1, "expired entry must be refetched");
}

// ============================================================================
// DERIVED ENUMS
// ============================================================================

#[tokio::test]
async fn test_get_enum_identity_and_members() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    let first = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    let second = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(
        first.identifiers().collect::<Vec<_>>(),
        vec!["OPEN", "IN_PROGRESS", "RESOLVED", "CLOSED"]
    );
    let member = first.get("IN_PROGRESS").unwrap();
    assert_eq!(member.value, "in_progress");
    assert_eq!(member.label, "In Progress");
    assert_eq!(first.choices(), fixtures::ticket_status_choices());
}

#[tokio::test]
async fn test_get_enum_empty_group() {
    let registry = fixtures::memory_registry();
    let result = registry.get_enum("nonexistent", &none()).await;
    assertions::assert_empty_group(&result, "nonexistent");
    assert!(!registry.has_memoized_enum("nonexistent", &none()));
}

#[tokio::test]
async fn test_get_enum_guards_numeric_values() {
    let registry = fixtures::memory_registry();
    registry.register_enum::<Priority>(None).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    let priority = registry.get_enum("Priority", &none()).await.unwrap();
    assert_eq!(priority.identifiers().collect::<Vec<_>>(), vec!["K_1", "K_2"]);
    assert_eq!(priority.label_for("2"), Some("Low"));
}

#[tokio::test]
async fn test_get_enum_identifier_collision() {
    let registry = fixtures::memory_registry();
    registry
        .register_defaults("g", vec![("A", "a-b", "A"), ("B", "a_b", "B")])
        .unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    let result = registry.get_enum("g", &none()).await;
    assertions::assert_validation_code(&result, "identifier_collision");
}

#[tokio::test]
async fn test_invalidate_drops_memoized_enum() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    let first = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();

    registry
        .invalidate_cache(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert!(!registry.has_memoized_enum(fixtures::TICKET_STATUS, &none()));

    let second = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_enum_shares_one_instance() {
    let registry = fixtures::ticket_status_registry().await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .get_enum(fixtures::TICKET_STATUS, &ChoiceFilters::new())
                .await
                .unwrap()
        }));
    }

    let mut enums = Vec::new();
    for handle in handles {
        enums.push(handle.await.unwrap());
    }
    let memoized = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert!(enums.iter().all(|e| **e == *memoized));
}

// ============================================================================
// INVALIDATION
// ============================================================================

#[tokio::test]
async fn test_stale_until_invalidated() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    registry
        .get_choices(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();

    // Without a hook the store write is invisible to cached readers.
    registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();
    assert_eq!(
        registry
            .get_choices(fixtures::TICKET_STATUS, &none())
            .await
            .unwrap()
            .len(),
        4
    );

    registry
        .invalidate_cache(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert_eq!(
        registry
            .get_choices(fixtures::TICKET_STATUS, &none())
            .await
            .unwrap()
            .len(),
        5
    );
}

#[tokio::test]
async fn test_hook_invalidates_on_single_row_writes() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    InvalidationHook::attach(&registry).unwrap();

    let before = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    let custom = registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();

    let after = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert!(after.contains("CUSTOM"));

    registry
        .store()
        .update(
            custom.id,
            ChoiceUpdate {
                label: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        registry
            .get_label(fixtures::TICKET_STATUS, "custom", &none())
            .await
            .unwrap()
            .as_deref(),
        Some("Renamed")
    );

    registry.store().delete(custom.id).await.unwrap();
    assert_eq!(
        registry
            .get_choices(fixtures::TICKET_STATUS, &none())
            .await
            .unwrap()
            .len(),
        4
    );
}

#[tokio::test]
async fn test_filtered_entry_survives_write_invalidation() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    InvalidationHook::attach(&registry).unwrap();

    let by_value = ChoiceFilters::new().with("value", "custom");
    assert!(registry
        .get_choices(fixtures::TICKET_STATUS, &by_value)
        .await
        .unwrap()
        .is_empty());

    registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();

    assert!(registry
        .get_choices(fixtures::TICKET_STATUS, &by_value)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        registry
            .get_choices(fixtures::TICKET_STATUS, &none())
            .await
            .unwrap()
            .len(),
        5
    );
}

#[tokio::test]
async fn test_hook_does_not_keep_registry_alive() {
    let registry = fixtures::memory_registry();
    let store = Arc::clone(registry.store());
    InvalidationHook::attach(&registry).unwrap();
    drop(registry);

    store
        .create(NewChoice::new("g", "a", "A"))
        .await
        .expect("write succeeds after the registry is gone");
}

#[tokio::test]
async fn test_invalidate_unknown_key_is_ok() {
    let registry = fixtures::memory_registry();
    registry.invalidate_cache("never_read", &none()).await.unwrap();
    assert_eq!(registry.cache().stats().await.unwrap().entry_count, 0);
}

// ============================================================================
// REGISTRATION
// ============================================================================

#[test]
fn test_register_defaults_validation() {
    let registry = fixtures::memory_registry();

    let result = registry.register_defaults(
        "g",
        vec![
            serde_json::json!(["A", "a", "A"]),
            serde_json::json!(["B", "b"]),
        ],
    );
    assertions::assert_validation_code(&result, "invalid_format");

    let result = registry.register_defaults("g", vec![("A", "a", "A"), ("B", "a", "B")]);
    assertions::assert_validation_code(&result, "duplicate_value");

    let result = registry.register_defaults("", vec![("A", "a", "A")]);
    assertions::assert_validation_code(&result, "empty_group_name");

    assert!(registry.registered_groups().is_empty());
}

#[test]
fn test_register_defaults_warns_on_bad_identifier() {
    init_test_tracing();
    let registry = fixtures::memory_registry();
    let report = registry
        .register_defaults("g", vec![("in progress", "in_progress", "In Progress")])
        .unwrap();
    assert_eq!(report.registered, 1);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0]
        .to_string()
        .contains("not a valid enum member identifier"));
}

#[test]
fn test_register_enum_label_fallback() {
    let registry = fixtures::memory_registry();
    let report = registry.register_enum::<TicketState>(None).unwrap();
    assert_eq!(report.group_name, "TicketState");

    let defaults = registry.registered_defaults("TicketState").unwrap();
    assert_eq!(defaults[0].name, "Open");
    assert_eq!(defaults[0].value, "OPEN");
    assert_eq!(defaults[0].label, "Open");
    assert_eq!(defaults[1].label, "Closed");

    registry.register_enum::<TicketState>(Some("states")).unwrap();
    assert_eq!(registry.registered_groups(), vec!["TicketState", "states"]);
}

#[tokio::test]
async fn test_register_from_toml_and_sync() {
    let registry = fixtures::memory_registry();
    registry
        .register_from_toml(
            r#"
            ticket_status = [
                ["OPEN", "open", "Open"],
                ["CLOSED", "closed", "Closed"],
            ]
            priority = [["HIGH", 1, "High"], ["LOW", 2, "Low"]]
            "#,
        )
        .unwrap();

    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    let priority = registry.get_choices("priority", &none()).await.unwrap();
    assert_eq!(priority, vec![Choice::new("1", "High"), Choice::new("2", "Low")]);
}

// ============================================================================
// VALIDATOR
// ============================================================================

#[tokio::test]
async fn test_choice_validator() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    let validator = ChoiceValidator::new(fixtures::TICKET_STATUS);

    validator.validate(&*registry, "open").await.unwrap();

    let result = validator.validate(&*registry, "bogus").await;
    assertions::assert_validation_code(&result, "invalid_choice_group");
    match result {
        Err(DbChoiceError::Validation(ValidationError::InvalidChoice { value, .. })) => {
            assert_eq!(value, "bogus")
        }
        other => panic!("Expected InvalidChoice, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_choice_validator_compares_string_form() {
    let registry = fixtures::memory_registry();
    registry
        .register_defaults("priority", vec![("HIGH", 1, "High")])
        .unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    ChoiceValidator::new("priority")
        .validate(&*registry, 1)
        .await
        .unwrap();
}

// ============================================================================
// SQLITE-BACKED REGISTRY
// ============================================================================

#[tokio::test]
async fn test_sqlite_backed_registry() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let store = SqliteChoiceStore::new(temp_dir.path().join("choices.db"))
        .await
        .unwrap();
    let registry = Arc::new(ChoiceRegistry::with_defaults(
        Arc::new(store),
        Arc::new(InMemoryCache::new()),
    ));
    InvalidationHook::attach(&registry).unwrap();

    registry
        .register_defaults(fixtures::TICKET_STATUS, fixtures::ticket_status_defaults())
        .unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();

    let status = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert_eq!(status.len(), 4);

    let result = registry
        .store()
        .create(NewChoice::new(fixtures::TICKET_STATUS, "open", "Duplicate"))
        .await;
    assertions::assert_unique_violation(&result);

    registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();
    let status = registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    assert_eq!(status.len(), 5);
}

#[tokio::test]
async fn test_dyn_store_and_cache() {
    let store: Arc<dyn ChoiceStore> = Arc::new(InMemoryChoiceStore::new());
    let cache: Arc<dyn CacheBackend> = Arc::new(InMemoryCache::new());
    let registry = Arc::new(ChoiceRegistry::with_defaults(store, cache));
    InvalidationHook::attach(&registry).unwrap();

    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    assert_eq!(registry.get_label("g", "a", &none()).await.unwrap().as_deref(), Some("A"));
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_sync_creates_one_row_per_default(triples in generators::arb_default_triples()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let registry = fixtures::memory_registry();
            registry.register_defaults("g", triples.clone()).unwrap();
            registry.sync_defaults(SyncOptions::default()).await.unwrap();

            let choices = registry.get_choices("g", &ChoiceFilters::new()).await.unwrap();
            let expected: Vec<Choice> = triples
                .iter()
                .map(|(_, value, label)| Choice::new(value.clone(), label.clone()))
                .collect();
            assert_eq!(choices, expected);
        });
    }

    #[test]
    fn prop_cache_key_ignores_filter_order(
        a in generators::arb_filter_value(),
        b in generators::arb_filter_value(),
    ) {
        let registry = fixtures::memory_registry();
        let forward = ChoiceFilters::new().with("x", a.clone()).with("y", b.clone());
        let backward = ChoiceFilters::new().with("y", b).with("x", a);
        prop_assert_eq!(
            registry.cache_key("g", &forward),
            registry.cache_key("g", &backward)
        );
    }
}

// ============================================================================
// RACES AND DEGRADED BACKENDS
// ============================================================================

/// Cache whose next `get` reads its entry and then waits to be resumed.
#[derive(Default)]
struct PausingCache {
    inner: InMemoryCache,
    armed: AtomicBool,
    paused: Notify,
    resume: Notify,
}

impl PausingCache {
    fn pause_next_get(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheBackend for PausingCache {
    async fn get(&self, key: &str) -> DbChoiceResult<Option<Vec<Choice>>> {
        let cached = self.inner.get(key).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.paused.notify_one();
            self.resume.notified().await;
        }
        Ok(cached)
    }

    async fn set(&self, key: &str, choices: &[Choice], ttl: Duration) -> DbChoiceResult<()> {
        self.inner.set(key, choices, ttl).await
    }

    async fn delete(&self, key: &str) -> DbChoiceResult<bool> {
        self.inner.delete(key).await
    }

    async fn clear(&self) -> DbChoiceResult<u64> {
        self.inner.clear().await
    }

    async fn stats(&self) -> DbChoiceResult<CacheStats> {
        self.inner.stats().await
    }
}

#[tokio::test]
async fn test_invalidation_during_enum_derivation_is_kept() {
    let registry = Arc::new(ChoiceRegistry::with_defaults(
        Arc::new(InMemoryChoiceStore::new()),
        Arc::new(PausingCache::default()),
    ));
    InvalidationHook::attach(&registry).unwrap();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    registry.get_choices("g", &none()).await.unwrap();

    registry.cache().pause_next_get();
    let reader = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            registry
                .get_enum("g", &ChoiceFilters::new())
                .await
                .unwrap()
        })
    };
    registry.cache().paused.notified().await;

    // The reader already holds the one-row list when this write lands.
    registry
        .store()
        .create(NewChoice::new("g", "b", "B"))
        .await
        .unwrap();
    registry.cache().resume.notify_one();

    let raced = reader.await.unwrap();
    assert_eq!(raced.len(), 1);
    assert!(!registry.has_memoized_enum("g", &none()));

    let current = registry.get_enum("g", &none()).await.unwrap();
    assert_eq!(current.len(), 2);
    assert_eq!(registry.get_choices("g", &none()).await.unwrap().len(), 2);
    assert!(Arc::ptr_eq(
        &current,
        &registry.get_enum("g", &none()).await.unwrap()
    ));
}

#[tokio::test]
async fn test_reset_discards_in_flight_derivation() {
    let registry = Arc::new(ChoiceRegistry::with_defaults(
        Arc::new(InMemoryChoiceStore::new()),
        Arc::new(PausingCache::default()),
    ));
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    registry.get_choices("g", &none()).await.unwrap();

    registry.cache().pause_next_get();
    let reader = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.get_enum("g", &ChoiceFilters::new()).await })
    };
    registry.cache().paused.notified().await;
    registry.reset();
    registry.cache().resume.notify_one();

    reader.await.unwrap().unwrap();
    assert!(!registry.has_memoized_enum("g", &none()));
}

#[tokio::test]
async fn test_unbounded_ttl_from_env() {
    let config = RegistryConfig::from_lookup(|key| {
        (key == "DBCHOICE_CACHE_TTL_SECS").then(|| u64::MAX.to_string())
    })
    .unwrap();
    let registry = ChoiceRegistry::new(
        Arc::new(InMemoryChoiceStore::new()),
        Arc::new(InMemoryCache::new()),
        config,
    )
    .unwrap();
    registry.register_defaults("g", vec![("A", "a", "A")]).unwrap();
    registry.sync_defaults(SyncOptions::default()).await.unwrap();
    registry.store().reset_query_count();

    assert_eq!(registry.get_choices("g", &none()).await.unwrap().len(), 1);
    assert_eq!(registry.get_choices("g", &none()).await.unwrap().len(), 1);
    assert_eq!(registry.store().query_count(), 1);
}

#[tokio::test]
async fn test_sync_succeeds_when_cache_offline() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    registry
        .get_choices(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();
    registry
        .register_defaults("priority", vec![("HIGH", "high", "High")])
        .unwrap();

    registry.cache().set_available(false);
    let report = registry.sync_defaults(SyncOptions::default()).await.unwrap();
    assert_eq!(report.deleted, 4);
    assert_eq!(report.created, 5);

    assert_eq!(registry.store().len(), 5);
    assert_eq!(registry.store().query("priority", &none()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_write_succeeds_when_hook_cannot_reach_cache() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    InvalidationHook::attach(&registry).unwrap();
    registry
        .get_enum(fixtures::TICKET_STATUS, &none())
        .await
        .unwrap();

    registry.cache().set_available(false);
    let record = registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();

    let stored = registry.store().get(record.id).await.unwrap();
    assert_eq!(stored.map(|r| r.value).as_deref(), Some("custom"));
    assert!(!registry.has_memoized_enum(fixtures::TICKET_STATUS, &none()));
}

#[tokio::test]
async fn test_filter_field_case_is_folded() {
    let registry = fixtures::ticket_status_registry().await.unwrap();
    registry
        .store()
        .create(fixtures::custom_choice(fixtures::TICKET_STATUS, "custom", "Custom"))
        .await
        .unwrap();

    let upper = ChoiceFilters::new().with("IS_SYSTEM_DEFAULT", true);
    let lower = ChoiceFilters::new().with("is_system_default", true);
    assert_eq!(
        registry.cache_key(fixtures::TICKET_STATUS, &upper),
        registry.cache_key(fixtures::TICKET_STATUS, &lower)
    );

    let cold = registry
        .get_choices(fixtures::TICKET_STATUS, &upper)
        .await
        .unwrap();
    assert_eq!(cold.len(), 4);

    registry.store().reset_query_count();
    let warm = registry
        .get_choices(fixtures::TICKET_STATUS, &lower)
        .await
        .unwrap();
    assert_eq!(cold, warm);
    assert_eq!(registry.store().query_count(), 0);
}
