//! Runtime enumerations derived from a group's current choices

use crate::naming::member_identifier;
use crate::{Choice, DbChoiceError, DbChoiceResult, ValidationError};
use std::collections::HashMap;

/// One member of a [`DerivedEnum`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    pub identifier: String,
    pub value: String,
    pub label: String,
}

/// A closed set of named constants mirroring a group's rows at derivation time.
///
/// Members keep the order of the choice list they were built from and are
/// addressable by identifier or by stored value. Equality is structural.
#[derive(Debug, Clone)]
pub struct DerivedEnum {
    name: String,
    members: Vec<EnumMember>,
    by_identifier: HashMap<String, usize>,
    by_value: HashMap<String, usize>,
}

impl DerivedEnum {
    /// Build an enum named `name` from `choices`.
    ///
    /// Fails with [`DbChoiceError::EmptyGroup`] when `choices` is empty and
    /// with [`ValidationError::IdentifierCollision`] when two values slugify
    /// to the same identifier.
    pub fn derive(name: &str, choices: &[Choice], guard: &str) -> DbChoiceResult<Self> {
        if choices.is_empty() {
            return Err(DbChoiceError::EmptyGroup {
                group_name: name.to_string(),
            });
        }

        let mut members = Vec::with_capacity(choices.len());
        let mut by_identifier = HashMap::with_capacity(choices.len());
        let mut by_value = HashMap::with_capacity(choices.len());

        for (index, choice) in choices.iter().enumerate() {
            let identifier = member_identifier(&choice.value, guard);
            if let Some(&existing) = by_identifier.get(&identifier) {
                let first: &EnumMember = &members[existing];
                return Err(ValidationError::IdentifierCollision {
                    group_name: name.to_string(),
                    identifier,
                    first: first.value.clone(),
                    second: choice.value.clone(),
                }
                .into());
            }
            by_identifier.insert(identifier.clone(), index);
            by_value.entry(choice.value.clone()).or_insert(index);
            members.push(EnumMember {
                identifier,
                value: choice.value.clone(),
                label: choice.label.clone(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            members,
            by_identifier,
            by_value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member by identifier, e.g. `"IN_PROGRESS"`.
    pub fn get(&self, identifier: &str) -> Option<&EnumMember> {
        self.by_identifier.get(identifier).map(|&i| &self.members[i])
    }

    /// Member by stored value.
    pub fn from_value(&self, value: &str) -> Option<&EnumMember> {
        self.by_value.get(value).map(|&i| &self.members[i])
    }

    pub fn label_for(&self, value: &str) -> Option<&str> {
        self.from_value(value).map(|m| m.label.as_str())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.by_identifier.contains_key(identifier)
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.identifier.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnumMember> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The `(value, label)` pairs in member order.
    pub fn choices(&self) -> Vec<Choice> {
        self.members
            .iter()
            .map(|m| Choice::new(m.value.clone(), m.label.clone()))
            .collect()
    }
}

impl PartialEq for DerivedEnum {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.members == other.members
    }
}

impl Eq for DerivedEnum {}

impl<'a> IntoIterator for &'a DerivedEnum {
    type Item = &'a EnumMember;
    type IntoIter = std::slice::Iter<'a, EnumMember>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket_choices() -> Vec<Choice> {
        vec![
            Choice::new("open", "OPEN"),
            Choice::new("in_progress", "IN_PROGRESS"),
            Choice::new("resolved", "RESOLVED"),
            Choice::new("closed", "CLOSED"),
        ]
    }

    #[test]
    fn test_derive_members_in_order() {
        let e = DerivedEnum::derive("ticket_status", &ticket_choices(), "K_").unwrap();
        let idents: Vec<&str> = e.identifiers().collect();
        assert_eq!(idents, vec!["OPEN", "IN_PROGRESS", "RESOLVED", "CLOSED"]);
        assert_eq!(e.get("IN_PROGRESS").unwrap().value, "in_progress");
        assert_eq!(e.label_for("closed"), Some("CLOSED"));
        assert!(e.from_value("bogus").is_none());
    }

    #[test]
    fn test_derive_empty_fails() {
        let err = DerivedEnum::derive("nonexistent", &[], "K_").unwrap_err();
        assert!(matches!(err, DbChoiceError::EmptyGroup { .. }));
        assert!(err.to_string().contains("No choices found for group"));
    }

    #[test]
    fn test_digit_values_get_guard() {
        let choices = vec![Choice::new("1", "High"), Choice::new("2", "Low")];
        let e = DerivedEnum::derive("numbers", &choices, "K_").unwrap();
        assert!(e.contains("K_1"));
        assert!(e.contains("K_2"));
    }

    #[test]
    fn test_identifier_collision() {
        let choices = vec![Choice::new("a-b", "Dash"), Choice::new("a_b", "Underscore")];
        let err = DerivedEnum::derive("g", &choices, "K_").unwrap_err();
        assert!(matches!(
            err,
            DbChoiceError::Validation(ValidationError::IdentifierCollision { .. })
        ));
    }

    #[test]
    fn test_structural_equality() {
        let a = DerivedEnum::derive("ticket_status", &ticket_choices(), "K_").unwrap();
        let b = DerivedEnum::derive("ticket_status", &ticket_choices(), "K_").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.choices(), ticket_choices());
    }
}
