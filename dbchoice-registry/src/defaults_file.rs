//! TOML defaults documents.
//!
//! ```toml
//! ticket_status = [
//!     ["OPEN", "open", "Open"],
//!     ["CLOSED", "closed", "Closed"],
//! ]
//! priority = [["HIGH", 1, "High"], ["LOW", 2, "Low"]]
//! ```

use dbchoice_core::{ChoiceScalar, ConfigError, RawChoice};
use toml::{Table, Value};

fn scalar(value: Value) -> ChoiceScalar {
    match value {
        Value::String(s) => ChoiceScalar::Text(s),
        Value::Integer(i) => ChoiceScalar::Int(i),
        Value::Float(_) => ChoiceScalar::Unsupported("float".to_string()),
        Value::Boolean(_) => ChoiceScalar::Unsupported("boolean".to_string()),
        Value::Datetime(_) => ChoiceScalar::Unsupported("datetime".to_string()),
        Value::Array(_) => ChoiceScalar::Unsupported("array".to_string()),
        Value::Table(_) => ChoiceScalar::Unsupported("table".to_string()),
    }
}

fn raw_choice(value: Value) -> RawChoice {
    match value {
        Value::Array(parts) => RawChoice(parts.into_iter().map(scalar).collect()),
        other => RawChoice(vec![scalar(other)]),
    }
}

/// Parse a defaults document into `(group_name, raw choices)` pairs, sorted
/// by group name. Shape errors inside a group are left to normalization.
pub(crate) fn parse_defaults(document: &str) -> Result<Vec<(String, Vec<RawChoice>)>, ConfigError> {
    let table: Table = document.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        reason: e.message().to_string(),
    })?;

    table
        .into_iter()
        .map(|(group_name, value)| match value {
            Value::Array(items) => Ok((group_name, items.into_iter().map(raw_choice).collect())),
            other => Err(ConfigError::Parse {
                reason: format!(
                    "group {} must be an array of [name, value, label] arrays, got {}",
                    group_name,
                    other.type_str()
                ),
            }),
        })
        .collect()
}
