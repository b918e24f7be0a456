//! dbchoice Test Utilities
//!
//! Shared test infrastructure for the dbchoice workspace:
//! - Proptest generators for groups, filters, and registrations
//! - Fixtures for the common `ticket_status` scenario
//! - A recording change listener
//! - Custom assertions for dbchoice errors

pub use dbchoice_core::{
    Choice, ChoiceFilters, ChoiceRecord, DbChoiceError, DbChoiceResult, DefaultChoice,
    FilterValue, NewChoice, QueryError, StoreError, ValidationError,
};
pub use dbchoice_registry::{ChoiceRegistry, SyncOptions};
pub use dbchoice_storage::{InMemoryCache, InMemoryChoiceStore};

use async_trait::async_trait;
use dbchoice_storage::{ChangeListener, ChoiceChange};
use std::sync::{Arc, Mutex};

/// Registry over the in-memory store and cache.
pub type MemoryRegistry = ChoiceRegistry<InMemoryChoiceStore, InMemoryCache>;

/// Install a test-writer `tracing` subscriber honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// RECORDING LISTENER
// ============================================================================

/// Change listener that keeps every notification it receives.
#[derive(Debug, Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<ChoiceChange>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<ChoiceChange> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.changes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChangeListener for RecordingListener {
    async fn on_change(&self, change: &ChoiceChange) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(change.clone());
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for dbchoice inputs.

    use super::*;
    use proptest::prelude::*;

    /// A non-empty group name.
    pub fn arb_group_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,15}"
    }

    /// A filter field name, valid or not.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("name".to_string()),
            Just("value".to_string()),
            Just("label".to_string()),
            Just("is_system_default".to_string()),
            "[a-z_]{1,12}",
        ]
    }

    pub fn arb_filter_value() -> impl Strategy<Value = FilterValue> {
        prop_oneof![
            any::<bool>().prop_map(FilterValue::Bool),
            any::<i64>().prop_map(FilterValue::Int),
            "[A-Za-z0-9 _-]{0,12}".prop_map(FilterValue::Text),
        ]
    }

    pub fn arb_filters() -> impl Strategy<Value = ChoiceFilters> {
        prop::collection::vec((arb_field_name(), arb_filter_value()), 0..4)
            .prop_map(|pairs| pairs.into_iter().collect())
    }

    /// Filters every store accepts: known fields with values of the right type.
    pub fn arb_valid_filters() -> impl Strategy<Value = ChoiceFilters> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of("[a-z]{1,6}"),
        )
            .prop_map(|(is_system_default, value)| {
                let mut filters = ChoiceFilters::new();
                if let Some(flag) = is_system_default {
                    filters.insert("is_system_default", flag);
                }
                if let Some(value) = value {
                    filters.insert("value", value);
                }
                filters
            })
    }

    /// A well-formed default registration: identifier names, unique names
    /// and values, in a random but fixed order.
    pub fn arb_default_triples() -> impl Strategy<Value = Vec<(String, String, String)>> {
        prop::collection::btree_set("[A-Z][A-Z0-9_]{0,8}", 1..8)
            .prop_map(|names| names.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
            .prop_map(|names| {
                names
                    .into_iter()
                    .map(|name| {
                        let value = name.to_lowercase();
                        let label = format!("Label {}", name);
                        (name, value, label)
                    })
                    .collect()
            })
    }

    pub fn arb_new_choice(group_name: String) -> impl Strategy<Value = NewChoice> {
        ("[a-z0-9_]{1,10}", "[A-Za-z ]{1,16}", 0i32..100, any::<bool>()).prop_map(
            move |(value, label, ordering, is_system_default)| {
                NewChoice::new(group_name.clone(), value, label)
                    .with_ordering(ordering)
                    .system_default(is_system_default)
            },
        )
    }

    pub fn arb_choice() -> impl Strategy<Value = Choice> {
        ("[a-z0-9_]{1,10}", "[A-Za-z ]{1,16}").prop_map(|(value, label)| Choice::new(value, label))
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common scenarios.

    use super::*;

    pub const TICKET_STATUS: &str = "ticket_status";

    /// The four `ticket_status` defaults in registration order.
    pub fn ticket_status_defaults() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("OPEN", "open", "Open"),
            ("IN_PROGRESS", "in_progress", "In Progress"),
            ("RESOLVED", "resolved", "Resolved"),
            ("CLOSED", "closed", "Closed"),
        ]
    }

    pub fn ticket_status_choices() -> Vec<Choice> {
        ticket_status_defaults()
            .into_iter()
            .map(|(_, value, label)| Choice::new(value, label))
            .collect()
    }

    /// A fresh registry over the in-memory store and cache.
    pub fn memory_registry() -> Arc<MemoryRegistry> {
        Arc::new(ChoiceRegistry::with_defaults(
            Arc::new(InMemoryChoiceStore::new()),
            Arc::new(InMemoryCache::new()),
        ))
    }

    /// A registry with `ticket_status` registered and synchronized.
    pub async fn ticket_status_registry() -> DbChoiceResult<Arc<MemoryRegistry>> {
        let registry = memory_registry();
        registry.register_defaults(TICKET_STATUS, ticket_status_defaults())?;
        registry.sync_defaults(SyncOptions::default()).await?;
        Ok(registry)
    }

    /// A custom (non system default) row for `group_name`.
    pub fn custom_choice(group_name: &str, value: &str, label: &str) -> NewChoice {
        NewChoice::new(group_name, value, label).with_ordering(99)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for dbchoice-specific results.

    use super::*;

    /// Assert that a DbChoiceResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &DbChoiceResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a DbChoiceResult is a Validation error with the given code.
    #[track_caller]
    pub fn assert_validation_code<T: std::fmt::Debug>(result: &DbChoiceResult<T>, code: &str) {
        match result {
            Err(DbChoiceError::Validation(e)) => {
                assert_eq!(e.code(), code, "Wrong validation error: {}", e);
            }
            other => panic!("Expected Validation error {}, got: {:?}", code, other),
        }
    }

    /// Assert that a DbChoiceResult is an EmptyGroup error for `group_name`.
    #[track_caller]
    pub fn assert_empty_group<T: std::fmt::Debug>(result: &DbChoiceResult<T>, group_name: &str) {
        match result {
            Err(DbChoiceError::EmptyGroup { group_name: g }) => {
                assert_eq!(g, group_name, "Wrong group in EmptyGroup error");
            }
            other => panic!("Expected EmptyGroup for {}, got: {:?}", group_name, other),
        }
    }

    /// Assert that a DbChoiceResult is a UniqueViolation store error.
    #[track_caller]
    pub fn assert_unique_violation<T: std::fmt::Debug>(result: &DbChoiceResult<T>) {
        match result {
            Err(DbChoiceError::Store(StoreError::UniqueViolation { .. })) => {}
            other => panic!("Expected UniqueViolation, got: {:?}", other),
        }
    }

    /// Assert the values of `choices`, in order.
    #[track_caller]
    pub fn assert_values(choices: &[Choice], expected: &[&str]) {
        let values: Vec<&str> = choices.iter().map(|c| c.value.as_str()).collect();
        assert_eq!(values, expected, "Choice values mismatch");
    }

    /// Assert that records are in display order: `(ordering, label)` ascending.
    #[track_caller]
    pub fn assert_display_order(records: &[ChoiceRecord]) {
        for pair in records.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                (a.ordering, &a.label) <= (b.ordering, &b.label),
                "Rows out of order: ({}, {}) before ({}, {})",
                a.ordering,
                a.label,
                b.ordering,
                b.label
            );
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dbchoice_storage::ChoiceStore;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_ticket_status_registry_fixture() {
        let registry = fixtures::ticket_status_registry().await.unwrap();
        let choices = registry
            .get_choices(fixtures::TICKET_STATUS, &ChoiceFilters::new())
            .await
            .unwrap();
        assert_eq!(choices, fixtures::ticket_status_choices());
    }

    #[tokio::test]
    async fn test_recording_listener() {
        let store = InMemoryChoiceStore::new();
        let listener = Arc::new(RecordingListener::new());
        store.subscribe(listener.clone()).unwrap();

        store
            .create(fixtures::custom_choice("g", "x", "X"))
            .await
            .unwrap();
        assert_eq!(listener.len(), 1);
        assert_eq!(listener.changes()[0].group_name, "g");
    }

    #[test]
    fn test_assert_empty_group() {
        let result: DbChoiceResult<()> = Err(DbChoiceError::EmptyGroup {
            group_name: "nothing".to_string(),
        });
        assertions::assert_empty_group(&result, "nothing");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_defaults_register(triples in generators::arb_default_triples()) {
            let registry = fixtures::memory_registry();
            let report = registry.register_defaults("g", triples.clone()).unwrap();
            prop_assert_eq!(report.registered, triples.len());
            prop_assert!(report.warnings.is_empty());
        }

        #[test]
        fn prop_valid_filters_resolve(filters in generators::arb_valid_filters()) {
            prop_assert!(filters.resolve().is_ok());
        }
    }
}
