//! Recovery from an interrupted run
//!
//! A run that died part way can leave snapshots mounted, a snapshot taken
//! and archives written for today. Tidy undoes exactly that: it unmounts
//! everything below the mount root, recomputes the tier today's run chose
//! and removes today's copies of that tier, so `run` can be repeated.
//! Running it again finds nothing left to do.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use super::history::History;
use super::policy::{StepFailure, StepPolicy};
use super::scheduler::tier_for_day;
use super::snapshot::SnapshotManager;
use crate::config::Settings;
use crate::error::ZborgResult;
use crate::models::{Dataset, Label};
use crate::providers::ArchiveTool;

/// What a tidy pass removed
#[derive(Debug, Default, Serialize)]
pub struct TidyReport {
    pub unmounted: Vec<PathBuf>,
    /// `dataset@label`
    pub snapshots_destroyed: Vec<String>,
    /// `repository::archive`
    pub archives_deleted: Vec<String>,
    pub failures: Vec<StepFailure>,
}

impl TidyReport {
    /// Nothing needed doing
    pub fn is_noop(&self) -> bool {
        self.unmounted.is_empty()
            && self.snapshots_destroyed.is_empty()
            && self.archives_deleted.is_empty()
            && self.failures.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TidyRecovery<'a> {
    settings: &'a Settings,
    snapshots: &'a SnapshotManager<'a>,
    archives: &'a dyn ArchiveTool,
    policy: StepPolicy,
}

impl<'a> TidyRecovery<'a> {
    pub fn new(
        settings: &'a Settings,
        snapshots: &'a SnapshotManager<'a>,
        archives: &'a dyn ArchiveTool,
        policy: StepPolicy,
    ) -> Self {
        Self {
            settings,
            snapshots,
            archives,
            policy,
        }
    }

    /// Clean up after a partial run of `datasets` on `today`
    pub fn tidy(&self, datasets: &[Dataset], today: NaiveDate) -> ZborgResult<TidyReport> {
        let mut report = TidyReport::default();

        self.unmount_all(&mut report)?;
        for dataset in datasets {
            self.tidy_dataset(dataset, today, &mut report)?;
        }

        if report.is_noop() {
            info!("nothing to tidy");
        } else {
            info!(
                unmounted = report.unmounted.len(),
                snapshots = report.snapshots_destroyed.len(),
                archives = report.archives_deleted.len(),
                failures = report.failures.len(),
                "tidy finished"
            );
        }
        Ok(report)
    }

    /// Unmount everything below the mount root, deepest first
    fn unmount_all(&self, report: &mut TidyReport) -> ZborgResult<()> {
        let root = &self.settings.mount_root;
        let provider = self.snapshots.provider();

        let Some(mut mounts) =
            self.policy
                .handle("list mounts", provider.mounts_under(root), &mut report.failures)?
        else {
            return Ok(());
        };
        mounts.sort_by(|a, b| {
            b.components()
                .count()
                .cmp(&a.components().count())
                .then_with(|| b.cmp(a))
        });

        for path in mounts {
            let step = format!("unmount {}", path.display());
            if self
                .policy
                .handle(&step, provider.unmount(&path), &mut report.failures)?
                .is_some()
            {
                info!(path = %path.display(), "unmounted");
                remove_empty_dirs(&path, root);
                report.unmounted.push(path);
            }
        }
        Ok(())
    }

    fn tidy_dataset(&self, dataset: &Dataset, today: NaiveDate, report: &mut TidyReport) -> ZborgResult<()> {
        let history = History::new(self.settings, self.snapshots, self.archives);

        let step = format!("read history of {}", dataset);
        let Some(labels) = self
            .policy
            .handle(&step, history.labels(dataset), &mut report.failures)?
        else {
            return Ok(());
        };
        let (tier, _) = tier_for_day(&labels, today);
        let is_todays = |l: &Label| l.tier() == tier && l.date() == today;

        if dataset.is_snapshot() {
            for label in labels.iter().filter(|&l| is_todays(l)) {
                let name = label.to_string();
                let step = format!("destroy {}@{}", dataset, name);
                if self
                    .policy
                    .handle(&step, self.snapshots.destroy(dataset, &name), &mut report.failures)?
                    .is_some()
                {
                    report.snapshots_destroyed.push(format!("{}@{}", dataset, name));
                }
            }
        }

        for repo in self.settings.repositories(dataset) {
            let step = format!("list {}", repo);
            let Some(entries) = self
                .policy
                .handle(&step, history.archives_of(&repo, dataset), &mut report.failures)?
            else {
                continue;
            };

            let mut deleted = false;
            for entry in entries.iter().filter(|e| is_todays(&e.label)) {
                let step = format!("delete {}", repo.archive_ref(&entry.archive));
                if self
                    .policy
                    .handle(&step, self.archives.delete(&repo, &entry.archive), &mut report.failures)?
                    .is_some()
                {
                    info!(repository = %repo, archive = %entry.archive, "partial archive deleted");
                    report.archives_deleted.push(repo.archive_ref(&entry.archive));
                    deleted = true;
                }
            }
            if deleted {
                let step = format!("compact {}", repo);
                self.policy
                    .handle(&step, self.archives.compact(&repo), &mut report.failures)?;
            }
        }
        Ok(())
    }
}

/// Remove `path` and its now-empty parents, stopping at `root`
fn remove_empty_dirs(path: &Path, root: &Path) {
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }
        if let Err(e) = fs::remove_dir(dir) {
            if dir.exists() {
                warn!(path = %dir.display(), error = %e, "mount point left in place");
            }
            break;
        }
        current = dir.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BackupMode, RemoteLocation};
    use crate::testing::{test_settings, FakeBorg, FakeZfs};
    use std::time::Duration;
    use tempfile::TempDir;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()
    }

    #[test]
    fn test_tidy_forced_month_partial_run() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = test_settings(temp_dir.path());
        settings.remote_dest = Some(RemoteLocation::parse("nas:/srv/borg").unwrap());
        let dataset = settings.datasets[0].clone();
        let repos = settings.repositories(&dataset);

        // Interrupted run: forced month snapshot taken, local archive
        // written, tree still mounted.
        let zfs = FakeZfs::new(&["pool/data"]);
        zfs.add_snapshot("pool/data", "month-20240605010000");
        let mount = settings.mount_root.join("pool_data");
        fs::create_dir_all(&mount).unwrap();
        zfs.add_mount(&mount);
        let borg = FakeBorg::new();
        borg.add_repository(&repos[0].location, &["month-20240605010000"]);

        let snapshots = SnapshotManager::new(&zfs, Duration::ZERO);
        let tidy = TidyRecovery::new(&settings, &snapshots, &borg, StepPolicy::BestEffort);
        let report = tidy.tidy(&settings.datasets, today()).unwrap();

        assert_eq!(report.unmounted, vec![mount.clone()]);
        assert!(!mount.exists());
        assert_eq!(report.snapshots_destroyed, vec!["pool/data@month-20240605010000"]);
        assert_eq!(
            report.archives_deleted,
            vec![format!("{}::month-20240605010000", repos[0].location)]
        );
        assert!(report.is_clean());
        assert!(zfs.snapshots_of("pool/data").is_empty());
        assert!(zfs.mounted().is_empty());
        assert!(borg.archives(&repos[0].location).is_empty());

        // Second pass is a no-op
        let again = tidy.tidy(&settings.datasets, today()).unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn test_tidy_keeps_other_days_and_tiers() {
        let temp_dir = TempDir::new().unwrap();
        let settings = test_settings(temp_dir.path());
        let dataset = settings.datasets[0].clone();
        let repo = settings.repositories(&dataset)[0].clone();

        let zfs = FakeZfs::new(&["pool/data"]);
        for label in [
            "month-20240601010000",
            "week-20240602010000",
            "day-20240604010000",
            "day-20240605010000",
        ] {
            zfs.add_snapshot("pool/data", label);
        }
        let borg = FakeBorg::new();
        borg.add_repository(
            &repo.location,
            &["month-20240601010000", "day-20240604010000", "day-20240605010000"],
        );

        let snapshots = SnapshotManager::new(&zfs, Duration::ZERO);
        let report = TidyRecovery::new(&settings, &snapshots, &borg, StepPolicy::BestEffort)
            .tidy(&settings.datasets, today())
            .unwrap();

        assert_eq!(report.snapshots_destroyed, vec!["pool/data@day-20240605010000"]);
        assert_eq!(
            zfs.snapshots_of("pool/data"),
            vec![
                "day-20240604010000",
                "month-20240601010000",
                "week-20240602010000"
            ]
        );
        assert_eq!(
            borg.archives(&repo.location),
            vec!["month-20240601010000", "day-20240604010000"]
        );
        assert_eq!(borg.compacts(), vec![repo.location.clone()]);
    }

    #[test]
    fn test_tidy_continues_past_failures() {
        let temp_dir = TempDir::new().unwrap();
        let settings = test_settings(temp_dir.path());
        let dataset = settings.datasets[0].clone();
        let repo = settings.repositories(&dataset)[0].clone();

        let zfs = FakeZfs::new(&["pool/data"]);
        zfs.add_snapshot("pool/data", "month-20240605010000");
        let busy = settings.mount_root.join("pool_data");
        fs::create_dir_all(&busy).unwrap();
        zfs.add_mount(&busy);
        zfs.fail_unmount_of(&busy);
        let borg = FakeBorg::new();
        borg.add_repository(&repo.location, &["month-20240605010000"]);
        borg.fail_on(&repo.location);

        let snapshots = SnapshotManager::new(&zfs, Duration::ZERO);
        let report = TidyRecovery::new(&settings, &snapshots, &borg, StepPolicy::BestEffort)
            .tidy(&settings.datasets, today())
            .unwrap();

        assert_eq!(report.failures.len(), 2);
        assert!(report.failures[0].step.starts_with("unmount"));
        assert!(report.failures[1].step.starts_with("delete"));
        // The snapshot between the two failures was still removed
        assert_eq!(report.snapshots_destroyed, vec!["pool/data@month-20240605010000"]);
    }

    #[test]
    fn test_tidy_plain_dataset() {
        let temp_dir = TempDir::new().unwrap();
        let mut settings = test_settings(temp_dir.path());
        settings.datasets = vec![Dataset::new("/srv/www", BackupMode::Plain, false)];
        let dataset = settings.datasets[0].clone();
        let repo = settings.repositories(&dataset)[0].clone();

        let zfs = FakeZfs::new(&[]);
        let borg = FakeBorg::new();
        borg.add_repository(
            &repo.location,
            &["month-20240601010000", "week-20240605010000"],
        );

        let snapshots = SnapshotManager::new(&zfs, Duration::ZERO);
        let report = TidyRecovery::new(&settings, &snapshots, &borg, StepPolicy::BestEffort)
            .tidy(&settings.datasets, today())
            .unwrap();

        assert_eq!(report.archives_deleted.len(), 1);
        assert_eq!(borg.archives(&repo.location), vec!["month-20240601010000"]);
        assert!(zfs.events().is_empty());
    }

    #[test]
    fn test_remove_empty_dirs_stops_at_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("mnt");
        let deep = root.join("pool_data/a/b");
        fs::create_dir_all(&deep).unwrap();
        fs::write(root.join("pool_data/keep"), b"x").unwrap();

        remove_empty_dirs(&deep, &root);
        assert!(!root.join("pool_data/a").exists());
        assert!(root.join("pool_data").exists());
        assert!(root.exists());
    }
}
