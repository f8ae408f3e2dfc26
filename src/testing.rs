//! In-memory test doubles for the external tools
//!
//! Everything here is single-threaded (the engine is), so interior
//! mutability is plain `RefCell`.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Settings;
use crate::error::{ZborgError, ZborgResult};
use crate::models::{BackupMode, Dataset, RemoteLocation, Repository, RetentionPolicy};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};
use crate::providers::{ArchiveTool, CreateOptions, RemoteShell, SnapshotProvider};

fn failure(program: &str, stderr: impl Into<String>) -> ZborgError {
    ZborgError::Command {
        program: program.to_string(),
        status: 1,
        stderr: stderr.into(),
    }
}

/// Settings rooted in a scratch directory: local destination only,
/// one non-recursive snapshot dataset `pool/data`, no settle delay
pub fn test_settings(root: &Path) -> Settings {
    let local = root.join("backup");
    fs::create_dir_all(&local).unwrap();
    Settings {
        datasets: vec![Dataset::new("pool/data", BackupMode::Snapshot, false)],
        mode: BackupMode::Snapshot,
        recursive: false,
        local_dest: Some(local),
        skip_local: false,
        remote_dest: None,
        passphrase_file: root.join("passphrase"),
        retention: RetentionPolicy {
            month_keep: 12,
            week_keep: 4,
            day_keep: 7,
        },
        compression: "auto,zstd".into(),
        files_cache: "ctime,size,inode".into(),
        pre_hook: None,
        post_hook: None,
        mono_repo: None,
        cache_base: None,
        remote_path: None,
        local_read_access: None,
        mount_root: root.join("mnt"),
        settle_seconds: 0,
        exclude_marker: ".nobackup".into(),
    }
}

/// Records every command and answers with a canned output
pub struct RecordingRunner {
    calls: RefCell<Vec<CommandSpec>>,
    responder: Box<dyn Fn(&CommandSpec) -> CommandOutput>,
}

impl RecordingRunner {
    /// Every command succeeds with empty output
    pub fn new() -> Self {
        Self::with_responder(|_| CommandOutput::default())
    }

    pub fn with_responder(responder: impl Fn(&CommandSpec) -> CommandOutput + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }

    /// Rendered command lines, in call order
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.to_string()).collect()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, spec: &CommandSpec) -> ZborgResult<CommandOutput> {
        self.calls.borrow_mut().push(spec.clone());
        Ok((self.responder)(spec))
    }
}

/// A ZFS pool held in memory
#[derive(Default)]
pub struct FakeZfs {
    datasets: Vec<String>,
    snapshots: RefCell<BTreeSet<(String, String)>>,
    mounts: RefCell<Vec<PathBuf>>,
    events: RefCell<Vec<String>>,
    fail_mount: RefCell<Option<String>>,
    fail_unmount: RefCell<Option<PathBuf>>,
    fail_create: RefCell<bool>,
}

impl FakeZfs {
    pub fn new(datasets: &[&str]) -> Self {
        Self {
            datasets: datasets.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn add_snapshot(&self, dataset: &str, label: &str) {
        self.snapshots
            .borrow_mut()
            .insert((dataset.to_string(), label.to_string()));
    }

    pub fn snapshots_of(&self, dataset: &str) -> Vec<String> {
        self.snapshots
            .borrow()
            .iter()
            .filter(|(d, _)| d == dataset)
            .map(|(_, l)| l.clone())
            .collect()
    }

    pub fn mounted(&self) -> Vec<PathBuf> {
        self.mounts.borrow().clone()
    }

    /// Pretend something is already mounted at `target`
    pub fn add_mount(&self, target: &Path) {
        self.mounts.borrow_mut().push(target.to_path_buf());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn fail_mount_of(&self, dataset: &str) {
        *self.fail_mount.borrow_mut() = Some(dataset.to_string());
    }

    pub fn fail_unmount_of(&self, target: &Path) {
        *self.fail_unmount.borrow_mut() = Some(target.to_path_buf());
    }

    pub fn fail_creates(&self) {
        *self.fail_create.borrow_mut() = true;
    }

    fn tree(&self, dataset: &str, recursive: bool) -> Vec<String> {
        let child_prefix = format!("{}/", dataset);
        self.datasets
            .iter()
            .filter(|d| *d == dataset || (recursive && d.starts_with(&child_prefix)))
            .cloned()
            .collect()
    }
}

impl SnapshotProvider for FakeZfs {
    fn create(&self, dataset: &str, label: &str, recursive: bool) -> ZborgResult<()> {
        if *self.fail_create.borrow() {
            return Err(failure("zfs", "out of space"));
        }
        if !self.datasets.iter().any(|d| d == dataset) {
            return Err(failure("zfs", format!("dataset does not exist: {}", dataset)));
        }
        let tree = self.tree(dataset, recursive);
        let mut snapshots = self.snapshots.borrow_mut();
        if tree.iter().any(|d| snapshots.contains(&(d.clone(), label.to_string()))) {
            return Err(failure("zfs", format!("snapshot '{}@{}' already exists", dataset, label)));
        }
        for d in tree {
            snapshots.insert((d, label.to_string()));
        }
        self.events
            .borrow_mut()
            .push(format!("create {}@{}", dataset, label));
        Ok(())
    }

    fn destroy(&self, dataset: &str, label: &str, recursive: bool) -> ZborgResult<()> {
        let mut snapshots = self.snapshots.borrow_mut();
        for d in self.tree(dataset, recursive) {
            snapshots.remove(&(d, label.to_string()));
        }
        self.events
            .borrow_mut()
            .push(format!("destroy {}@{}", dataset, label));
        Ok(())
    }

    fn list(&self, dataset: &str) -> ZborgResult<Vec<String>> {
        Ok(self.snapshots_of(dataset))
    }

    fn datasets_with_snapshot(&self, dataset: &str, label: &str) -> ZborgResult<Vec<String>> {
        let snapshots = self.snapshots.borrow();
        Ok(self
            .tree(dataset, true)
            .into_iter()
            .filter(|d| snapshots.contains(&(d.clone(), label.to_string())))
            .collect())
    }

    fn mount(&self, dataset: &str, label: &str, target: &Path) -> ZborgResult<()> {
        if self.fail_mount.borrow().as_deref() == Some(dataset) {
            return Err(failure("mount", format!("cannot mount {}@{}", dataset, label)));
        }
        if !self
            .snapshots
            .borrow()
            .contains(&(dataset.to_string(), label.to_string()))
        {
            return Err(failure("mount", format!("{}@{} does not exist", dataset, label)));
        }
        if !target.is_dir() {
            return Err(failure("mount", format!("mount point {} missing", target.display())));
        }
        self.mounts.borrow_mut().push(target.to_path_buf());
        self.events
            .borrow_mut()
            .push(format!("mount {}@{}", dataset, label));
        Ok(())
    }

    fn unmount(&self, target: &Path) -> ZborgResult<()> {
        if self.fail_unmount.borrow().as_deref() == Some(target) {
            return Err(failure("umount", format!("{}: target is busy", target.display())));
        }
        let mut mounts = self.mounts.borrow_mut();
        let idx = mounts
            .iter()
            .position(|m| m == target)
            .ok_or_else(|| failure("umount", format!("{}: not mounted", target.display())))?;
        mounts.remove(idx);
        self.events
            .borrow_mut()
            .push(format!("unmount {}", target.display()));
        Ok(())
    }

    fn mounts_under(&self, root: &Path) -> ZborgResult<Vec<PathBuf>> {
        Ok(self
            .mounts
            .borrow()
            .iter()
            .filter(|m| m.starts_with(root) && m.as_path() != root)
            .cloned()
            .collect())
    }
}

/// borg's `--glob-archives` as zborg uses it: a literal prefix and `*`
fn glob_matches(glob: &str, archive: &str) -> bool {
    match glob.strip_suffix('*') {
        Some(prefix) => archive.starts_with(prefix),
        None => archive == glob,
    }
}

/// Trailing `%Y%m%d%H%M%S` of an archive name
fn timestamp_of(archive: &str) -> &str {
    archive.rsplit('-').next().unwrap_or(archive)
}

/// A set of borg repositories held in memory, keyed by location
#[derive(Default)]
pub struct FakeBorg {
    repos: RefCell<BTreeMap<String, Vec<String>>>,
    invalid: RefCell<BTreeSet<String>>,
    failing: RefCell<BTreeSet<String>>,
    prunes: RefCell<Vec<(String, RetentionPolicy, Option<String>)>>,
    creates: RefCell<Vec<(String, String, PathBuf)>>,
    compacts: RefCell<Vec<String>>,
    inits: RefCell<Vec<String>>,
}

impl FakeBorg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repository(&self, location: &str, archives: &[&str]) {
        self.repos.borrow_mut().insert(
            location.to_string(),
            archives.iter().map(|a| a.to_string()).collect(),
        );
    }

    /// Something is at `location`, but it is not a repository
    pub fn add_invalid(&self, location: &str) {
        self.invalid.borrow_mut().insert(location.to_string());
    }

    /// Every create/prune/delete against `location` fails
    pub fn fail_on(&self, location: &str) {
        self.failing.borrow_mut().insert(location.to_string());
    }

    pub fn archives(&self, location: &str) -> Vec<String> {
        self.repos.borrow().get(location).cloned().unwrap_or_default()
    }

    pub fn prunes(&self) -> Vec<(String, RetentionPolicy, Option<String>)> {
        self.prunes.borrow().clone()
    }

    pub fn creates(&self) -> Vec<(String, String, PathBuf)> {
        self.creates.borrow().clone()
    }

    pub fn compacts(&self) -> Vec<String> {
        self.compacts.borrow().clone()
    }

    pub fn inits(&self) -> Vec<String> {
        self.inits.borrow().clone()
    }

    fn check_failing(&self, repo: &Repository) -> ZborgResult<()> {
        if self.failing.borrow().contains(&repo.location) {
            return Err(failure("borg", format!("Connection closed by remote host: {}", repo.location)));
        }
        Ok(())
    }

    fn missing(repo: &Repository) -> ZborgError {
        failure("borg", format!("Repository {} does not exist.", repo.location))
    }
}

impl ArchiveTool for FakeBorg {
    fn repository_exists(&self, repo: &Repository) -> ZborgResult<bool> {
        if self.invalid.borrow().contains(&repo.location) {
            return Err(ZborgError::Precondition(format!("{} is not a valid repository", repo)));
        }
        Ok(self.repos.borrow().contains_key(&repo.location))
    }

    fn init(&self, repo: &Repository) -> ZborgResult<()> {
        let mut repos = self.repos.borrow_mut();
        if repos.contains_key(&repo.location) {
            return Err(failure("borg", "A repository already exists"));
        }
        repos.insert(repo.location.clone(), Vec::new());
        self.inits.borrow_mut().push(repo.location.clone());
        Ok(())
    }

    fn create(
        &self,
        repo: &Repository,
        archive: &str,
        source: &Path,
        _options: &CreateOptions,
    ) -> ZborgResult<()> {
        self.check_failing(repo)?;
        let mut repos = self.repos.borrow_mut();
        let archives = repos.get_mut(&repo.location).ok_or_else(|| Self::missing(repo))?;
        if archives.iter().any(|a| a == archive) {
            return Err(failure("borg", format!("Archive {} already exists", archive)));
        }
        archives.push(archive.to_string());
        self.creates.borrow_mut().push((
            repo.location.clone(),
            archive.to_string(),
            source.to_path_buf(),
        ));
        Ok(())
    }

    fn list(&self, repo: &Repository) -> ZborgResult<Vec<String>> {
        self.repos
            .borrow()
            .get(&repo.location)
            .cloned()
            .ok_or_else(|| Self::missing(repo))
    }

    fn delete(&self, repo: &Repository, archive: &str) -> ZborgResult<()> {
        self.check_failing(repo)?;
        let mut repos = self.repos.borrow_mut();
        let archives = repos.get_mut(&repo.location).ok_or_else(|| Self::missing(repo))?;
        let idx = archives
            .iter()
            .position(|a| a == archive)
            .ok_or_else(|| failure("borg", format!("Archive {} does not exist", archive)))?;
        archives.remove(idx);
        Ok(())
    }

    fn prune(
        &self,
        repo: &Repository,
        policy: &RetentionPolicy,
        glob: Option<&str>,
    ) -> ZborgResult<()> {
        self.check_failing(repo)?;
        let mut repos = self.repos.borrow_mut();
        let archives = repos.get_mut(&repo.location).ok_or_else(|| Self::missing(repo))?;

        // Only the daily rule: the newest `day_keep` matched archives survive.
        let mut matched: Vec<String> = archives
            .iter()
            .filter(|a| glob.map_or(true, |g| glob_matches(g, a)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| timestamp_of(b).cmp(timestamp_of(a)));
        let doomed: BTreeSet<String> = matched.into_iter().skip(policy.day_keep as usize).collect();
        archives.retain(|a| !doomed.contains(a));

        self.prunes
            .borrow_mut()
            .push((repo.location.clone(), *policy, glob.map(str::to_string)));
        Ok(())
    }

    fn compact(&self, repo: &Repository) -> ZborgResult<()> {
        self.check_failing(repo)?;
        self.compacts.borrow_mut().push(repo.location.clone());
        Ok(())
    }
}

/// Remote host directories held in memory, keyed by `host:path`
#[derive(Default)]
pub struct FakeSsh {
    dirs: RefCell<BTreeSet<String>>,
    created: RefCell<Vec<String>>,
}

impl FakeSsh {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(location: &RemoteLocation) -> String {
        format!("{}:{}", location.host, location.shell_path())
    }

    pub fn add_directory(&self, location: &RemoteLocation) {
        self.dirs.borrow_mut().insert(Self::key(location));
    }

    pub fn created(&self) -> Vec<String> {
        self.created.borrow().clone()
    }
}

impl RemoteShell for FakeSsh {
    fn directory_exists(&self, location: &RemoteLocation) -> ZborgResult<bool> {
        Ok(self.dirs.borrow().contains(&Self::key(location)))
    }

    fn create_directory(&self, location: &RemoteLocation) -> ZborgResult<()> {
        let key = Self::key(location);
        self.dirs.borrow_mut().insert(key.clone());
        self.created.borrow_mut().push(key);
        Ok(())
    }
}
