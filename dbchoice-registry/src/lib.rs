//! dbchoice Registry
//!
//! Database-backed choice groups with code-declared defaults. Defaults are
//! registered in memory, synchronized into a [`ChoiceStore`], and read back
//! through a [`CacheBackend`] as ordered `(value, label)` lists, labels, or
//! runtime [`DerivedEnum`]s.
//!
//! ```no_run
//! use dbchoice_core::ChoiceFilters;
//! use dbchoice_registry::{ChoiceRegistry, InvalidationHook, SyncOptions};
//! use dbchoice_storage::{InMemoryCache, InMemoryChoiceStore};
//! use std::sync::Arc;
//!
//! # async fn run() -> dbchoice_core::DbChoiceResult<()> {
//! let registry = Arc::new(ChoiceRegistry::with_defaults(
//!     Arc::new(InMemoryChoiceStore::new()),
//!     Arc::new(InMemoryCache::new()),
//! ));
//! InvalidationHook::attach(&registry)?;
//!
//! registry.register_defaults(
//!     "ticket_status",
//!     vec![("OPEN", "open", "Open"), ("CLOSED", "closed", "Closed")],
//! )?;
//! registry.sync_defaults(SyncOptions::default()).await?;
//!
//! let status = registry.get_enum("ticket_status", &ChoiceFilters::new()).await?;
//! assert_eq!(status.label_for("open"), Some("Open"));
//! # Ok(())
//! # }
//! ```
//!
//! [`ChoiceStore`]: dbchoice_storage::ChoiceStore
//! [`CacheBackend`]: dbchoice_storage::CacheBackend
//! [`DerivedEnum`]: dbchoice_core::DerivedEnum

mod defaults_file;
mod enums;
mod hook;
mod registry;
mod sync;
mod validator;

pub use enums::{ChoiceEnum, EnumMemberSpec};
pub use hook::InvalidationHook;
pub use registry::{ChoiceRegistry, RegistrationReport};
pub use sync::{default_rows, SyncOptions, SyncReport};
pub use validator::ChoiceValidator;
