//! Fanning a single edit out over the members of a repeating series.

use std::{fmt, future::Future, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::data::{Event, RowID, sort_chronologically};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::store::DataStore;

/// Which members of a series an edit applies to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditScope {
    /// Only the targeted occurrence
    #[default]
    This,
    /// Every occurrence of the series
    All,
    /// The targeted occurrence and every later one
    ThisAndAfter,
}

impl EditScope {
    pub fn code(self) -> i64 {
        match self {
            EditScope::This => 0,
            EditScope::All => 1,
            EditScope::ThisAndAfter => 2,
        }
    }
}

impl TryFrom<i64> for EditScope {
    type Error = Error;
    fn try_from(code: i64) -> Result<Self> {
        Ok(match code {
            0 => EditScope::This,
            1 => EditScope::All,
            2 => EditScope::ThisAndAfter,
            other => return Err(Error::InvalidEditScope(other)),
        })
    }
}

impl FromStr for EditScope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "this" => EditScope::This,
            "all" => EditScope::All,
            "thisandafter" => EditScope::ThisAndAfter,
            _ => return Err(format!("unknown edit scope `{s}`")),
        })
    }
}

impl fmt::Display for EditScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EditScope::This => "this",
            EditScope::All => "all",
            EditScope::ThisAndAfter => "this-and-after",
        })
    }
}

/// Resolves edit scopes against a store and applies mutations to each target.
pub struct EditCascade<'a, S> {
    store: &'a S,
}

impl<'a, S: DataStore> EditCascade<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// The ids an edit with `scope` on `target` touches, in the order they
    /// are mutated.
    ///
    /// [`EditScope::This`] never hits the store, so a missing target is only
    /// noticed by the mutation itself.
    pub async fn resolve(&self, scope: EditScope, target: RowID) -> Result<Vec<RowID>> {
        if scope == EditScope::This {
            return Ok(vec![target]);
        }
        let event = self
            .store
            .get(target)
            .await?
            .ok_or(Error::event_not_found(target))?;
        let mut series = self.series(&event).await?;
        sort_chronologically(&mut series);

        if scope == EditScope::ThisAndAfter {
            let from = start_key(&event);
            series.retain(|member| start_key(member) >= from);
        }
        let ids: Vec<RowID> = series.iter().map(|member| member.id).collect();
        tracing::debug!(%scope, target, ?ids, "resolved edit targets");
        Ok(ids)
    }

    /// Run `mutation` for every id [`EditCascade::resolve`] returns, stopping
    /// at the first failure. Returns how many ids were mutated.
    ///
    /// Mutations already applied when one fails stay applied.
    pub async fn apply<F, Fut>(&self, scope: EditScope, target: RowID, mut mutation: F) -> Result<usize>
    where
        F: FnMut(RowID) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let ids = self.resolve(scope, target).await?;
        for (done, id) in ids.iter().enumerate() {
            if let Err(e) = mutation(*id).await {
                if done > 0 {
                    tracing::warn!(
                        %scope,
                        target,
                        failed = id,
                        done,
                        total = ids.len(),
                        "edit stopped partway through series"
                    );
                }
                return Err(e);
            }
        }
        Ok(ids.len())
    }

    async fn series(&self, event: &Event) -> Result<Vec<Event>> {
        match event.parent_id {
            None => Ok(vec![event.clone()]),
            Some(parent_id) => {
                self.store
                    .query(&Query::new().parent_ids([parent_id]))
                    .await
            }
        }
    }
}

fn start_key(event: &Event) -> (&str, &str) {
    let (day, time, _) = event.chronological_key();
    (day, time)
}
