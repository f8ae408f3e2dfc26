//! Retention enforcement
//!
//! Snapshots and archives follow different retention models. Snapshots of
//! a tier are counted: the newest `keep` survive, the rest are destroyed.
//! Archives are handed to borg's calendar-bucket prune with all three
//! counts at once, then the repository is compacted.

use tracing::info;

use super::policy::first_error;
use super::snapshot::SnapshotManager;
use crate::config::Settings;
use crate::error::{ZborgError, ZborgResult};
use crate::models::{Dataset, Label, Repository, Tier};
use crate::providers::ArchiveTool;

pub struct PruneEngine<'a> {
    settings: &'a Settings,
    snapshots: &'a SnapshotManager<'a>,
    archives: &'a dyn ArchiveTool,
}

impl<'a> PruneEngine<'a> {
    pub fn new(
        settings: &'a Settings,
        snapshots: &'a SnapshotManager<'a>,
        archives: &'a dyn ArchiveTool,
    ) -> Self {
        Self {
            settings,
            snapshots,
            archives,
        }
    }

    /// Destroy all but the newest `keep` snapshots of `tier`
    ///
    /// Returns the destroyed labels, oldest first.
    pub fn prune_snapshots(&self, dataset: &Dataset, tier: Tier, keep: u32) -> ZborgResult<Vec<Label>> {
        let prune_err = |e: ZborgError| {
            ZborgError::Prune(format!("snapshots of {} ({}): {}", dataset, tier, e))
        };

        let mut excess: Vec<Label> = self
            .snapshots
            .list_by_tier_descending(dataset, tier)
            .map_err(prune_err)?
            .into_iter()
            .skip(keep as usize)
            .collect();
        excess.reverse();

        for label in &excess {
            self.snapshots
                .destroy(dataset, &label.to_string())
                .map_err(prune_err)?;
        }
        if !excess.is_empty() {
            info!(dataset = %dataset, tier = %tier, keep, destroyed = excess.len(), "snapshots pruned");
        }
        Ok(excess)
    }

    /// Prune and compact one repository with the configured counts
    ///
    /// `glob` restricts pruning to one dataset's archives in a shared
    /// repository.
    pub fn prune_archives(&self, repo: &Repository, glob: Option<&str>) -> ZborgResult<()> {
        let prune_err = |e: ZborgError| ZborgError::Prune(format!("{}: {}", repo, e));

        self.archives
            .prune(repo, &self.settings.retention, glob)
            .map_err(prune_err)?;
        self.archives.compact(repo).map_err(prune_err)?;
        info!(repository = %repo, glob = ?glob, "archives pruned");
        Ok(())
    }

    /// Prune every enabled repository of `dataset`
    ///
    /// All repositories are attempted; the first failure is returned.
    pub fn prune_dataset_archives(&self, dataset: &Dataset) -> ZborgResult<()> {
        let glob = self.settings.archive_glob(dataset);
        let results = self
            .settings
            .repositories(dataset)
            .iter()
            .map(|repo| self.prune_archives(repo, glob.as_deref()))
            .collect();
        first_error(results)
    }
}
