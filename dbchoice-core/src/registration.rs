//! Normalization of default choice registrations

use crate::naming::is_valid_identifier;
use crate::{DefaultChoice, IdentifierWarning, ValidationError};
use std::collections::HashSet;

/// One part of a registration tuple before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceScalar {
    Text(String),
    Int(i64),
    /// Anything else; carries a description of what was found.
    Unsupported(String),
}

impl ChoiceScalar {
    fn kind(&self) -> &str {
        match self {
            ChoiceScalar::Text(_) => "string",
            ChoiceScalar::Int(_) => "integer",
            ChoiceScalar::Unsupported(kind) => kind,
        }
    }
}

impl From<&str> for ChoiceScalar {
    fn from(value: &str) -> Self {
        ChoiceScalar::Text(value.to_string())
    }
}

impl From<String> for ChoiceScalar {
    fn from(value: String) -> Self {
        ChoiceScalar::Text(value)
    }
}

impl From<i64> for ChoiceScalar {
    fn from(value: i64) -> Self {
        ChoiceScalar::Int(value)
    }
}

impl From<i32> for ChoiceScalar {
    fn from(value: i32) -> Self {
        ChoiceScalar::Int(i64::from(value))
    }
}

impl From<u32> for ChoiceScalar {
    fn from(value: u32) -> Self {
        ChoiceScalar::Int(i64::from(value))
    }
}

impl From<serde_json::Value> for ChoiceScalar {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::String(s) => ChoiceScalar::Text(s),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ChoiceScalar::Int(i),
                None => ChoiceScalar::Unsupported("float".to_string()),
            },
            Value::Null => ChoiceScalar::Unsupported("null".to_string()),
            Value::Bool(_) => ChoiceScalar::Unsupported("boolean".to_string()),
            Value::Array(_) => ChoiceScalar::Unsupported("array".to_string()),
            Value::Object(_) => ChoiceScalar::Unsupported("object".to_string()),
        }
    }
}

/// An unvalidated registration entry: ideally `(name, value, label)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawChoice(pub Vec<ChoiceScalar>);

impl<N, V, L> From<(N, V, L)> for RawChoice
where
    N: Into<ChoiceScalar>,
    V: Into<ChoiceScalar>,
    L: Into<ChoiceScalar>,
{
    fn from((name, value, label): (N, V, L)) -> Self {
        RawChoice(vec![name.into(), value.into(), label.into()])
    }
}

impl From<Vec<ChoiceScalar>> for RawChoice {
    fn from(parts: Vec<ChoiceScalar>) -> Self {
        RawChoice(parts)
    }
}

impl From<serde_json::Value> for RawChoice {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Array(parts) => {
                RawChoice(parts.into_iter().map(ChoiceScalar::from).collect())
            }
            other => RawChoice(vec![ChoiceScalar::from(other)]),
        }
    }
}

/// A validated registration batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDefaults {
    pub choices: Vec<DefaultChoice>,
    pub warnings: Vec<IdentifierWarning>,
}

/// Validate and stringify a batch of registration tuples.
///
/// Every tuple must have exactly three parts, each a string or integer.
/// Names and values must be unique within the batch. Names that are not
/// valid identifiers produce warnings, not errors.
pub fn normalize_defaults<I>(group_name: &str, choices: I) -> Result<NormalizedDefaults, ValidationError>
where
    I: IntoIterator,
    I::Item: Into<RawChoice>,
{
    if group_name.is_empty() {
        return Err(ValidationError::EmptyGroupName);
    }

    let mut normalized = Vec::new();
    let mut warnings = Vec::new();
    let mut seen_names = HashSet::new();
    let mut seen_values = HashSet::new();

    for (index, raw) in choices.into_iter().enumerate() {
        let RawChoice(parts) = raw.into();
        let [name, value, label]: [ChoiceScalar; 3] =
            parts
                .try_into()
                .map_err(|parts: Vec<ChoiceScalar>| ValidationError::InvalidFormat {
                    group_name: group_name.to_string(),
                    index,
                    arity: parts.len(),
                })?;

        let name = stringify(group_name, index, "name", name)?;
        let value = stringify(group_name, index, "value", value)?;
        let label = stringify(group_name, index, "label", label)?;

        if !is_valid_identifier(&name) {
            warnings.push(IdentifierWarning {
                group_name: group_name.to_string(),
                index,
                name: name.clone(),
            });
        }

        if !seen_names.insert(name.clone()) {
            return Err(ValidationError::DuplicateName {
                group_name: group_name.to_string(),
                name,
            });
        }
        if !seen_values.insert(value.clone()) {
            return Err(ValidationError::DuplicateValue {
                group_name: group_name.to_string(),
                value,
            });
        }

        normalized.push(DefaultChoice { name, value, label });
    }

    Ok(NormalizedDefaults {
        choices: normalized,
        warnings,
    })
}

fn stringify(
    group_name: &str,
    index: usize,
    field: &str,
    part: ChoiceScalar,
) -> Result<String, ValidationError> {
    match part {
        ChoiceScalar::Text(s) => Ok(s),
        ChoiceScalar::Int(i) => Ok(i.to_string()),
        other => Err(ValidationError::InvalidType {
            group_name: group_name.to_string(),
            index,
            field: field.to_string(),
            found: other.kind().to_string(),
        }),
    }
}
