//! dbchoice Core - Data Types
//!
//! Pure data structures and pure functions shared by every dbchoice crate:
//! choice rows, filters, cache keys, identifier rules, derived enums,
//! registration normalization, configuration and errors. No I/O.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod cache_key;
pub mod config;
pub mod derived_enum;
pub mod error;
pub mod filter;
pub mod naming;
pub mod record;
pub mod registration;

pub use cache_key::generate_cache_key;
pub use config::RegistryConfig;
pub use derived_enum::{DerivedEnum, EnumMember};
pub use error::{
    CacheError, ConfigError, DbChoiceError, DbChoiceResult, IdentifierWarning, QueryError,
    StoreError, ValidationError,
};
pub use filter::{ChoiceFilters, FieldMatch, FilterValue};
pub use naming::{is_valid_identifier, member_identifier};
pub use record::{
    display_order, sort_for_display, Choice, ChoiceRecord, ChoiceUpdate, DefaultChoice, NewChoice,
};
pub use registration::{normalize_defaults, ChoiceScalar, NormalizedDefaults, RawChoice};

/// Choice row identifier using UUIDv7 for timestamp-sortable IDs.
pub type ChoiceId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 ChoiceId.
pub fn new_choice_id() -> ChoiceId {
    Uuid::now_v7()
}
