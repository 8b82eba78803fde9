//! Calendar events: single and repeating, with invitations, scoped series
//! edits and compound queries.

use anyhow::Context;

pub mod calendar;
pub mod cascade;
pub mod config;
pub mod data;
pub mod error;
pub mod query;
pub mod recurrence;
pub mod store;
pub mod validate;

pub use calendar::{Calendar, Created};
pub use cascade::{EditCascade, EditScope};
pub use error::{Error, Result};
pub use query::Query;
pub use store::{DataStore, MemoryStore, Schedule, SqliteStore};

/// Like `std::env::var` but reports var name in error
pub fn env_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("couldn't get `{name}` env var"))
}
