//! Choice rows and the value types projected from them

use crate::{ChoiceId, Timestamp, ValidationError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A persisted choice row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRecord {
    pub id: ChoiceId,
    pub group_name: String,
    pub name: String,
    pub value: String,
    pub label: String,
    pub ordering: i32,
    pub is_system_default: bool,
    pub created_at: Timestamp,
}

impl ChoiceRecord {
    /// Project this row to its `(value, label)` pair.
    pub fn to_choice(&self) -> Choice {
        Choice::new(self.value.clone(), self.label.clone())
    }

    /// Apply an operator edit to this row.
    ///
    /// System default rows keep their `value`; every other field in
    /// [`ChoiceUpdate`] is editable.
    pub fn apply_update(&mut self, update: ChoiceUpdate) -> Result<(), ValidationError> {
        if let Some(value) = &update.value {
            if self.is_system_default && *value != self.value {
                return Err(ValidationError::ImmutableField {
                    id: self.id,
                    field: "value".to_string(),
                });
            }
        }

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(value) = update.value {
            self.value = value;
        }
        if let Some(label) = update.label {
            self.label = label;
        }
        if let Some(ordering) = update.ordering {
            self.ordering = ordering;
        }
        Ok(())
    }
}

impl std::fmt::Display for ChoiceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.value)
    }
}

/// Display order for choice rows: `ordering` ascending, then `label`.
pub fn display_order(a: &ChoiceRecord, b: &ChoiceRecord) -> Ordering {
    a.ordering
        .cmp(&b.ordering)
        .then_with(|| a.label.cmp(&b.label))
}

/// Sort rows into display order in place.
pub fn sort_for_display(records: &mut [ChoiceRecord]) {
    records.sort_by(display_order);
}

/// A row that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChoice {
    pub group_name: String,
    pub name: String,
    pub value: String,
    pub label: String,
    pub ordering: i32,
    pub is_system_default: bool,
}

impl NewChoice {
    /// Create a custom (non system default) choice. The name defaults to the value.
    pub fn new(
        group_name: impl Into<String>,
        value: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        let value = value.into();
        Self {
            group_name: group_name.into(),
            name: value.clone(),
            value,
            label: label.into(),
            ordering: 0,
            is_system_default: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ordering(mut self, ordering: i32) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn system_default(mut self, is_system_default: bool) -> Self {
        self.is_system_default = is_system_default;
        self
    }

    /// Check the row-level constraints a store enforces before insert.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.group_name.is_empty() {
            return Err(ValidationError::EmptyGroupName);
        }
        Ok(())
    }

    /// Assign an id and creation time.
    pub fn into_record(self) -> ChoiceRecord {
        ChoiceRecord {
            id: crate::new_choice_id(),
            group_name: self.group_name,
            name: self.name,
            value: self.value,
            label: self.label,
            ordering: self.ordering,
            is_system_default: self.is_system_default,
            created_at: Utc::now(),
        }
    }
}

/// Operator edit of an existing row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoiceUpdate {
    pub name: Option<String>,
    pub value: Option<String>,
    pub label: Option<String>,
    pub ordering: Option<i32>,
}

/// A `(value, label)` pair as served to field adapters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

impl<V: Into<String>, L: Into<String>> From<(V, L)> for Choice {
    fn from((value, label): (V, L)) -> Self {
        Self::new(value, label)
    }
}

/// A normalized default registration entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DefaultChoice {
    pub name: String,
    pub value: String,
    pub label: String,
}

impl DefaultChoice {
    pub fn new(name: impl Into<String>, value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            label: label.into(),
        }
    }

    /// Build the system default row for this entry at position `ordering`.
    pub fn to_new_choice(&self, group_name: &str, ordering: i32) -> NewChoice {
        NewChoice::new(group_name, self.value.clone(), self.label.clone())
            .with_name(self.name.clone())
            .with_ordering(ordering)
            .system_default(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================
