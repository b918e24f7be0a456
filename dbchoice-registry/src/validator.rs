//! Membership validation against a choice group.

use crate::ChoiceRegistry;
use dbchoice_core::{ChoiceFilters, DbChoiceResult, ValidationError};
use dbchoice_storage::{CacheBackend, ChoiceStore};
use std::fmt::Display;

/// Checks that a value is one of a group's current choices.
///
/// Two validators are equal when they name the same group and filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceValidator {
    pub group_name: String,
    pub filters: ChoiceFilters,
}

impl ChoiceValidator {
    pub fn new(group_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            filters: ChoiceFilters::new(),
        }
    }

    pub fn with_filters(mut self, filters: ChoiceFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Fails with [`ValidationError::InvalidChoice`] when `value`, compared
    /// by its string form, is not in the group.
    pub async fn validate<S, C>(&self, registry: &ChoiceRegistry<S, C>, value: impl Display) -> DbChoiceResult<()>
    where
        S: ChoiceStore + ?Sized,
        C: CacheBackend + ?Sized,
    {
        let value = value.to_string();
        let choices = registry.get_choices(&self.group_name, &self.filters).await?;
        if choices.iter().any(|choice| choice.value == value) {
            Ok(())
        } else {
            Err(ValidationError::InvalidChoice {
                group_name: self.group_name.clone(),
                value,
            }
            .into())
        }
    }
}
