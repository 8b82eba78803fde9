use std::fs;

use camino::Utf8Path;
use serde::Deserialize;

use crate::data::RowID;

/// Settings read from a JSON file.
///
/// Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Falls back to the `DATABASE_URL` env var when unset
    pub database_url: Option<String>,
    /// Zone given to new events that don't name one
    pub default_zone: String,
    /// Owner of new events when none is given
    pub default_owner: RowID,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            default_zone: "UTC".into(),
            default_owner: 1,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Utf8Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path.as_std_path())?;
        Ok(serde_json::from_str(&data)?)
    }

    /// The configured database, or `DATABASE_URL`.
    pub fn database_url(&self) -> anyhow::Result<String> {
        match &self.database_url {
            Some(url) => Ok(url.clone()),
            None => crate::env_var("DATABASE_URL"),
        }
    }
}
