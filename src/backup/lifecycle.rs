//! The `run` and `snap` lifecycles
//!
//! `run` takes each configured dataset through: read history, refuse if a
//! copy from today already exists, pick the tier, hook + snapshot + hook,
//! mount, archive to every destination, unmount, then prune snapshots of
//! the tier that ran and prune/compact the archives. `snap` archives an
//! existing, caller-named snapshot and prunes nothing.

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info};

use super::executor::BackupExecutor;
use super::history::History;
use super::mount::MountTree;
use super::policy::{StepFailure, StepPolicy};
use super::prune::PruneEngine;
use super::scheduler::select_tier;
use super::snapshot::SnapshotManager;
use crate::config::Settings;
use crate::error::{ZborgError, ZborgResult};
use crate::hooks::{HookPhase, Hooks};
use crate::models::{BackupMode, Dataset, Destination, Tier};
use crate::process::CommandRunner;
use crate::providers::{ArchiveTool, RemoteShell, SnapshotProvider};

/// The external capabilities a lifecycle drives
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub snapshots: &'a dyn SnapshotProvider,
    pub archives: &'a dyn ArchiveTool,
    pub remote: &'a dyn RemoteShell,
    /// Runs hook scripts
    pub runner: &'a dyn CommandRunner,
}

/// What happened to one dataset
#[derive(Debug, Clone, Serialize)]
pub struct DatasetReport {
    pub dataset: String,
    /// `None` for `snap`
    pub tier: Option<Tier>,
    pub forced: bool,
    pub label: String,
    pub archive: String,
    pub destinations: Vec<Destination>,
    pub snapshots_pruned: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub datasets: Vec<DatasetReport>,
    pub failures: Vec<StepFailure>,
}

pub struct Lifecycle<'a> {
    settings: &'a Settings,
    tools: Tools<'a>,
    snapshots: SnapshotManager<'a>,
    mounts: MountTree<'a>,
    executor: BackupExecutor<'a>,
    hooks: Hooks<'a>,
    policy: StepPolicy,
}

impl<'a> Lifecycle<'a> {
    pub fn new(settings: &'a Settings, tools: Tools<'a>, policy: StepPolicy) -> Self {
        Self {
            settings,
            tools,
            snapshots: SnapshotManager::new(tools.snapshots, settings.settle_delay()),
            mounts: MountTree::new(tools.snapshots, &settings.mount_root),
            executor: BackupExecutor::new(settings, tools.archives, tools.remote),
            hooks: Hooks::new(tools.runner, settings),
            policy,
        }
    }

    fn history(&self) -> History<'_> {
        History::new(self.settings, &self.snapshots, self.tools.archives)
    }

    fn prune_engine(&self) -> PruneEngine<'_> {
        PruneEngine::new(self.settings, &self.snapshots, self.tools.archives)
    }

    /// Back up every configured dataset, in order
    pub fn run(&self, now: NaiveDateTime) -> ZborgResult<RunReport> {
        self.each_dataset(|dataset| self.run_dataset(dataset, now))
    }

    /// Archive the existing copy `label` of every configured dataset
    pub fn snap(&self, label: &str) -> ZborgResult<RunReport> {
        self.each_dataset(|dataset| self.snap_dataset(dataset, label))
    }

    fn each_dataset<F>(&self, mut step: F) -> ZborgResult<RunReport>
    where
        F: FnMut(&Dataset) -> ZborgResult<DatasetReport>,
    {
        let mut report = RunReport::default();
        for dataset in &self.settings.datasets {
            let result = step(dataset);
            if let Err(e) = &result {
                error!(dataset = %dataset, error = %e, "dataset failed");
            }
            let name = format!("back up {}", dataset);
            if let Some(done) = self.policy.handle(&name, result, &mut report.failures)? {
                report.datasets.push(done);
            }
        }
        Ok(report)
    }

    pub fn run_dataset(&self, dataset: &Dataset, now: NaiveDateTime) -> ZborgResult<DatasetReport> {
        let history = self.history().labels(dataset)?;
        if let Some(existing) = history.iter().filter(|l| l.date() == now.date()).max() {
            return Err(ZborgError::PartialDay {
                dataset: dataset.name.clone(),
                label: existing.to_string(),
            });
        }

        let decision = select_tier(&history, now);
        let tier = decision.tier;
        let label = decision.label.to_string();
        info!(dataset = %dataset, %tier, forced = decision.forced, label = %label, "tier selected");

        let (archive, destinations) = match dataset.mode {
            BackupMode::Snapshot => {
                self.with_hooks(dataset, &label, Some(tier), || {
                    self.snapshots.create(dataset, &label)
                })?;
                self.archive(dataset, &label)?
            }
            BackupMode::Plain => {
                self.with_hooks(dataset, &label, Some(tier), || self.archive(dataset, &label))?
            }
        };

        let prune = self.prune_engine();
        let snapshots_pruned = if dataset.is_snapshot() {
            prune
                .prune_snapshots(dataset, tier, self.settings.retention.keep_for(tier))?
                .iter()
                .map(|l| l.to_string())
                .collect()
        } else {
            Vec::new()
        };
        prune.prune_dataset_archives(dataset)?;

        info!(dataset = %dataset, label = %label, "dataset done");
        Ok(DatasetReport {
            dataset: dataset.name.clone(),
            tier: Some(tier),
            forced: decision.forced,
            label,
            archive,
            destinations,
            snapshots_pruned,
        })
    }

    pub fn snap_dataset(&self, dataset: &Dataset, label: &str) -> ZborgResult<DatasetReport> {
        let (archive, destinations) = match dataset.mode {
            BackupMode::Snapshot => {
                if !self.snapshots.exists(dataset, label)? {
                    return Err(ZborgError::snapshot_not_found(format!("{}@{}", dataset, label)));
                }
                self.archive(dataset, label)?
            }
            BackupMode::Plain => {
                self.with_hooks(dataset, label, None, || self.archive(dataset, label))?
            }
        };

        info!(dataset = %dataset, label = label, "dataset done");
        Ok(DatasetReport {
            dataset: dataset.name.clone(),
            tier: None,
            forced: false,
            label: label.to_string(),
            archive,
            destinations,
            snapshots_pruned: Vec::new(),
        })
    }

    /// Run `capture` between the pre and post hooks
    ///
    /// The post hook runs even when the capture failed; the capture error
    /// wins when both fail.
    fn with_hooks<T>(
        &self,
        dataset: &Dataset,
        label: &str,
        tier: Option<Tier>,
        capture: impl FnOnce() -> ZborgResult<T>,
    ) -> ZborgResult<T> {
        self.hooks.run(HookPhase::Pre, dataset, label, tier)?;
        let captured = capture();
        let post = self.hooks.run(HookPhase::Post, dataset, label, tier);
        let value = captured?;
        post?;
        Ok(value)
    }

    /// Archive `label` of the dataset to every destination
    ///
    /// Snapshot trees are mounted for the duration and always unmounted
    /// again, whether or not archiving succeeded.
    fn archive(&self, dataset: &Dataset, label: &str) -> ZborgResult<(String, Vec<Destination>)> {
        match dataset.mode {
            BackupMode::Snapshot => {
                let handle = self.mounts.mount(dataset, label)?;
                let report = self.executor.run_backup(dataset, handle.root(), label);
                let unmounted = self.mounts.unmount(handle);
                let archive = report.archive.clone();
                let destinations = report.into_result()?;
                unmounted?;
                Ok((archive, destinations))
            }
            BackupMode::Plain => {
                let source = dataset.plain_path();
                if !source.is_dir() {
                    return Err(ZborgError::Precondition(format!(
                        "{} is not a directory",
                        source.display()
                    )));
                }
                let report = self.executor.run_backup(dataset, &source, label);
                let archive = report.archive.clone();
                Ok((archive, report.into_result()?))
            }
        }
    }
}
