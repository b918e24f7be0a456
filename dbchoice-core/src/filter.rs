//! Exact-match filters over choice rows
//!
//! Filters are supplied by callers as loose `field -> value` pairs and are
//! resolved against the fixed set of filterable columns before any store sees
//! them. Resolution rejects unknown fields and mistyped values.

use crate::{ChoiceRecord, QueryError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A filter value as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Capitalized so cache keys stay compatible with existing caches.
            FilterValue::Bool(true) => write!(f, "True"),
            FilterValue::Bool(false) => write!(f, "False"),
            FilterValue::Int(i) => write!(f, "{}", i),
            FilterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Int(i64::from(value))
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

/// Caller-supplied filter set. Empty means "no filters".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChoiceFilters(BTreeMap<String, FilterValue>);

impl ChoiceFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a constraint.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.0.iter()
    }

    /// Resolve every constraint against the filterable columns.
    pub fn resolve(&self) -> Result<Vec<FieldMatch>, QueryError> {
        self.0
            .iter()
            .map(|(field, value)| FieldMatch::resolve(field, value))
            .collect()
    }

    /// True when `record` satisfies every constraint.
    pub fn matches(&self, record: &ChoiceRecord) -> Result<bool, QueryError> {
        Ok(self.resolve()?.iter().all(|m| m.matches(record)))
    }
}

impl<K: Into<String>, V: Into<FilterValue>> FromIterator<(K, V)> for ChoiceFilters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A typed constraint on one filterable column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMatch {
    GroupName(String),
    Name(String),
    Value(String),
    Label(String),
    Ordering(i32),
    IsSystemDefault(bool),
}

impl FieldMatch {
    /// Field names are matched case-insensitively, the same way cache keys
    /// fold them.
    fn resolve(field: &str, value: &FilterValue) -> Result<Self, QueryError> {
        match field.to_lowercase().as_str() {
            "group_name" => text(field, value).map(FieldMatch::GroupName),
            "name" => text(field, value).map(FieldMatch::Name),
            "value" => text(field, value).map(FieldMatch::Value),
            "label" => text(field, value).map(FieldMatch::Label),
            "ordering" => match value {
                FilterValue::Int(i) => i32::try_from(*i)
                    .map(FieldMatch::Ordering)
                    .map_err(|_| invalid(field, value, "32-bit integer")),
                _ => Err(invalid(field, value, "integer")),
            },
            "is_system_default" => match value {
                FilterValue::Bool(b) => Ok(FieldMatch::IsSystemDefault(*b)),
                _ => Err(invalid(field, value, "boolean")),
            },
            _ => Err(QueryError::UnknownField {
                field: field.to_string(),
            }),
        }
    }

    /// Column name in persistent stores.
    pub fn column(&self) -> &'static str {
        match self {
            FieldMatch::GroupName(_) => "group_name",
            FieldMatch::Name(_) => "name",
            FieldMatch::Value(_) => "value",
            FieldMatch::Label(_) => "label",
            FieldMatch::Ordering(_) => "ordering",
            FieldMatch::IsSystemDefault(_) => "is_system_default",
        }
    }

    pub fn matches(&self, record: &ChoiceRecord) -> bool {
        match self {
            FieldMatch::GroupName(v) => record.group_name == *v,
            FieldMatch::Name(v) => record.name == *v,
            FieldMatch::Value(v) => record.value == *v,
            FieldMatch::Label(v) => record.label == *v,
            FieldMatch::Ordering(v) => record.ordering == *v,
            FieldMatch::IsSystemDefault(v) => record.is_system_default == *v,
        }
    }
}

// Integers are accepted for text columns, matching their rendered form.
fn text(field: &str, value: &FilterValue) -> Result<String, QueryError> {
    match value {
        FilterValue::Text(s) => Ok(s.clone()),
        FilterValue::Int(i) => Ok(i.to_string()),
        FilterValue::Bool(_) => Err(invalid(field, value, "string")),
    }
}

fn invalid(field: &str, value: &FilterValue, expected: &str) -> QueryError {
    QueryError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        expected: expected.to_string(),
    }
}
