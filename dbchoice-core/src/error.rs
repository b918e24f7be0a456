//! Error types for choice registry operations

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Registration and row validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid choice format in group {group_name} at index {index}: expected (name, value, label), got {arity} part(s)")]
    InvalidFormat {
        group_name: String,
        index: usize,
        arity: usize,
    },

    #[error("Invalid choice type in group {group_name} at index {index}: {field} must be a string or integer, got {found}")]
    InvalidType {
        group_name: String,
        index: usize,
        field: String,
        found: String,
    },

    #[error("Duplicate choice name '{name}' in group {group_name}")]
    DuplicateName { group_name: String, name: String },

    #[error("Duplicate choice value '{value}' in group {group_name}")]
    DuplicateValue { group_name: String, value: String },

    #[error("Group name must not be empty")]
    EmptyGroupName,

    #[error("Field {field} of system default choice {id} is immutable")]
    ImmutableField { id: Uuid, field: String },

    #[error("Values {first} and {second} in group {group_name} both derive member {identifier}")]
    IdentifierCollision {
        group_name: String,
        identifier: String,
        first: String,
        second: String,
    },

    #[error("'{value}' is not a valid choice for group {group_name}")]
    InvalidChoice { group_name: String, value: String },
}

impl ValidationError {
    /// Stable machine-readable code for form and serializer adapters.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidFormat { .. } => "invalid_format",
            ValidationError::InvalidType { .. } => "invalid_type",
            ValidationError::DuplicateName { .. } => "duplicate_name",
            ValidationError::DuplicateValue { .. } => "duplicate_value",
            ValidationError::EmptyGroupName => "empty_group_name",
            ValidationError::ImmutableField { .. } => "immutable_field",
            ValidationError::IdentifierCollision { .. } => "identifier_collision",
            ValidationError::InvalidChoice { .. } => "invalid_choice_group",
        }
    }
}

/// Store query errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown filter field: {field}")]
    UnknownField { field: String },

    #[error("Invalid filter value for {field}: expected {expected}, got {value}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },
}

/// Choice store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Choice store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Choice with value '{value}' already exists in group {group_name}")]
    UniqueViolation { group_name: String, value: String },

    #[error("Choice not found: {id}")]
    NotFound { id: Uuid },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Invalid stored row: {reason}")]
    InvalidRow { reason: String },

    #[error("Choice store lock poisoned")]
    LockPoisoned,
}

/// Cache layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Cache serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse defaults document: {reason}")]
    Parse { reason: String },
}

/// Master error type for all dbchoice errors.
#[derive(Debug, Clone, Error)]
pub enum DbChoiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("No choices found for group {group_name}")]
    EmptyGroup { group_name: String },

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for dbchoice operations.
pub type DbChoiceResult<T> = Result<T, DbChoiceError>;

/// Non-fatal registration finding: a choice name that cannot serve as an
/// enumeration member identifier. Logged and reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierWarning {
    pub group_name: String,
    pub index: usize,
    pub name: String,
}

impl fmt::Display for IdentifierWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Choice name '{}' at index {} in group {} is not a valid enum member identifier",
            self.name, self.index, self.group_name
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
