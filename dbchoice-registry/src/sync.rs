//! Reconciling registered defaults into the store.

use crate::ChoiceRegistry;
use dbchoice_core::{ChoiceFilters, DbChoiceResult, NewChoice};
use dbchoice_storage::{CacheBackend, ChoiceBatch, ChoiceStore, DeleteSpec};
use serde::Deserialize;

/// Which groups to synchronize and what to clear first.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Restrict to these groups. Names that were never registered are
    /// ignored. `None` means every registered group.
    pub group_names: Option<Vec<String>>,
    /// Delete existing system-default rows before recreating them.
    pub recreate_defaults: bool,
    /// Delete every row of the affected groups, custom rows included.
    /// Takes precedence over `recreate_defaults`.
    pub recreate_all: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            group_names: None,
            recreate_defaults: true,
            recreate_all: false,
        }
    }
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<String>,
    {
        self.group_names = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn recreate_defaults(mut self, recreate: bool) -> Self {
        self.recreate_defaults = recreate;
        self
    }

    pub fn recreate_all(mut self, recreate: bool) -> Self {
        self.recreate_all = recreate;
        self
    }

    fn delete_filters(&self) -> Option<ChoiceFilters> {
        if self.recreate_all {
            Some(ChoiceFilters::new())
        } else if self.recreate_defaults {
            Some(ChoiceFilters::new().with("is_system_default", true))
        } else {
            None
        }
    }
}

/// Summary of a `sync_defaults` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub groups: Vec<String>,
    pub deleted: u64,
    pub created: usize,
    /// Candidates that collided with surviving rows and were not inserted.
    pub skipped: usize,
}

impl<S, C> ChoiceRegistry<S, C>
where
    S: ChoiceStore + ?Sized,
    C: CacheBackend + ?Sized,
{
    /// Write registered defaults to the store as system-default rows.
    ///
    /// Deletes and creates run in one store transaction; on failure nothing
    /// is changed and the error propagates. Candidates whose value already
    /// exists in the group are skipped. After commit the unfiltered cache
    /// entry of each affected group is invalidated.
    pub async fn sync_defaults(&self, options: SyncOptions) -> DbChoiceResult<SyncReport> {
        let mut groups = Vec::new();
        let mut creates = Vec::new();

        for (group_name, defaults) in self.defaults_snapshot() {
            if let Some(wanted) = &options.group_names {
                if !wanted.contains(&group_name) {
                    continue;
                }
            }
            creates.extend(default_rows(&group_name, &defaults));
            groups.push(group_name);
        }

        if creates.is_empty() {
            tracing::info!(requested = ?options.group_names, "no default choices to synchronize");
            return Ok(SyncReport {
                groups,
                ..SyncReport::default()
            });
        }

        let candidates = creates.len();
        let deletes = options
            .delete_filters()
            .map(|filters| vec![DeleteSpec::new(groups.clone(), filters)])
            .unwrap_or_default();

        let outcome = self
            .store()
            .apply_batch(ChoiceBatch {
                deletes,
                creates,
                ignore_conflicts: true,
            })
            .await?;

        let none = ChoiceFilters::new();
        for group_name in &groups {
            if let Err(e) = self.invalidate_cache(group_name, &none).await {
                tracing::warn!(
                    group_name = %group_name,
                    error = %e,
                    "failed to invalidate choice cache after sync"
                );
            }
        }

        let report = SyncReport {
            deleted: outcome.deleted,
            created: outcome.created.len(),
            skipped: candidates - outcome.created.len(),
            groups,
        };
        tracing::info!(
            groups = report.groups.len(),
            deleted = report.deleted,
            created = report.created,
            skipped = report.skipped,
            "synchronized default choices"
        );
        Ok(report)
    }
}

/// Candidate rows for one group, as `sync_defaults` would insert them.
pub fn default_rows(group_name: &str, defaults: &[dbchoice_core::DefaultChoice]) -> Vec<NewChoice> {
    defaults
        .iter()
        .enumerate()
        .map(|(index, choice)| choice.to_new_choice(group_name, index as i32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_options_defaults() {
        let options = SyncOptions::default();
        assert!(options.recreate_defaults);
        assert!(!options.recreate_all);
        assert!(options.group_names.is_none());
    }

    #[test]
    fn test_delete_filters_by_mode() {
        assert_eq!(
            SyncOptions::new().recreate_all(true).delete_filters(),
            Some(ChoiceFilters::new())
        );
        assert_eq!(
            SyncOptions::new().delete_filters(),
            Some(ChoiceFilters::new().with("is_system_default", true))
        );
        assert_eq!(
            SyncOptions::new().recreate_defaults(false).delete_filters(),
            None
        );
    }

    #[test]
    fn test_sync_options_from_toml() {
        let options: SyncOptions = toml::from_str(
            r#"
            group_names = ["ticket_status"]
            recreate_all = true
            "#,
        )
        .unwrap();
        assert_eq!(options.group_names, Some(vec!["ticket_status".to_string()]));
        assert!(options.recreate_defaults);
        assert!(options.recreate_all);
    }

    #[test]
    fn test_default_rows() {
        let rows = default_rows(
            "g",
            &[
                dbchoice_core::DefaultChoice::new("A", "a", "Alpha"),
                dbchoice_core::DefaultChoice::new("B", "b", "Bravo"),
            ],
        );
        assert_eq!(rows[1].ordering, 1);
        assert!(rows.iter().all(|r| r.is_system_default && r.group_name == "g"));
    }
}
