//! Snapshot management on top of a `SnapshotProvider`

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ZborgError, ZborgResult};
use crate::models::{Dataset, Label, Tier};
use crate::providers::SnapshotProvider;

/// Creates, destroys and lists labelled copies of a dataset tree
pub struct SnapshotManager<'a> {
    provider: &'a dyn SnapshotProvider,
    settle: Duration,
}

impl<'a> SnapshotManager<'a> {
    /// `settle` is waited out after every create and destroy
    pub fn new(provider: &'a dyn SnapshotProvider, settle: Duration) -> Self {
        Self { provider, settle }
    }

    pub fn provider(&self) -> &'a dyn SnapshotProvider {
        self.provider
    }

    /// Take `dataset@label` (recursively when the dataset is recursive)
    pub fn create(&self, dataset: &Dataset, label: &str) -> ZborgResult<()> {
        self.provider
            .create(&dataset.name, label, dataset.recursive)
            .map_err(|e| ZborgError::CreateFailed {
                dataset: dataset.name.clone(),
                label: label.to_string(),
                reason: e.to_string(),
            })?;
        info!(dataset = %dataset, label = label, recursive = dataset.recursive, "snapshot created");
        self.settle();
        Ok(())
    }

    /// Destroy `dataset@label`; destroying an absent copy succeeds
    pub fn destroy(&self, dataset: &Dataset, label: &str) -> ZborgResult<()> {
        self.provider.destroy(&dataset.name, label, dataset.recursive)?;
        info!(dataset = %dataset, label = label, "snapshot destroyed");
        self.settle();
        Ok(())
    }

    /// Every zborg label held for the dataset, in no particular order
    ///
    /// Copies whose names are not zborg labels are ignored.
    pub fn list_labels(&self, dataset: &Dataset) -> ZborgResult<Vec<Label>> {
        let names = self.provider.list(&dataset.name)?;
        Ok(names.iter().filter_map(|n| Label::parse(n)).collect())
    }

    /// Labels of one tier, newest first
    pub fn list_by_tier_descending(&self, dataset: &Dataset, tier: Tier) -> ZborgResult<Vec<Label>> {
        let mut labels: Vec<Label> = self
            .list_labels(dataset)?
            .into_iter()
            .filter(|l| l.tier() == tier)
            .collect();
        labels.sort_by(|a, b| b.cmp(a));
        Ok(labels)
    }

    /// Whether `dataset@label` exists (any name, zborg label or not)
    pub fn exists(&self, dataset: &Dataset, label: &str) -> ZborgResult<bool> {
        Ok(self.provider.list(&dataset.name)?.iter().any(|n| n == label))
    }

    fn settle(&self) {
        if !self.settle.is_zero() {
            debug!(seconds = self.settle.as_secs(), "waiting for snapshot state to settle");
            thread::sleep(self.settle);
        }
    }
}
