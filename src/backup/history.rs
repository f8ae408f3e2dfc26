//! Where a dataset's existing labels come from
//!
//! Snapshot datasets keep their history as snapshots. Plain datasets have
//! none, so their history is read back from archive names in the first
//! enabled repository.

use crate::config::Settings;
use crate::error::ZborgResult;
use crate::models::repository::label_of_archive;
use crate::models::{BackupMode, Dataset, Label, Repository};
use crate::providers::ArchiveTool;

use super::snapshot::SnapshotManager;

/// An archive belonging to a dataset, with its parsed label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub archive: String,
    pub label: Label,
}

pub struct History<'a> {
    settings: &'a Settings,
    snapshots: &'a SnapshotManager<'a>,
    archives: &'a dyn ArchiveTool,
}

impl<'a> History<'a> {
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

    /// Every label currently held for `dataset`
    pub fn labels(&self, dataset: &Dataset) -> ZborgResult<Vec<Label>> {
        match dataset.mode {
            BackupMode::Snapshot => self.snapshots.list_labels(dataset),
            BackupMode::Plain => match self.settings.repositories(dataset).first() {
                Some(repo) => Ok(self
                    .archives_of(repo, dataset)?
                    .into_iter()
                    .map(|entry| entry.label)
                    .collect()),
                None => Ok(Vec::new()),
            },
        }
    }

    /// The dataset's labelled archives in `repo`; a missing repository has none
    ///
    /// In a shared repository only archives carrying the dataset's prefix
    /// are returned.
    pub fn archives_of(&self, repo: &Repository, dataset: &Dataset) -> ZborgResult<Vec<ArchiveEntry>> {
        if !self.archives.repository_exists(repo)? {
            return Ok(Vec::new());
        }
        let mono = self.settings.is_mono_repo();
        Ok(self
            .archives
            .list(repo)?
            .into_iter()
            .filter_map(|archive| {
                let label = label_of_archive(mono, dataset, &archive).and_then(Label::parse)?;
                Some(ArchiveEntry { archive, label })
            })
            .collect())
    }
}
