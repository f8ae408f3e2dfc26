//! Backup settings for zborg
//!
//! Settings come from a flat `KEY=value` file in env-file syntax (`#`
//! comments, optional `export ` prefix, optional quotes), read with
//! `dotenvy` without touching the process environment. The parsed value is
//! immutable and handed to every component; nothing reads process state
//! after loading except the passphrase, which lives in `Credentials`.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;
use zeroize::Zeroizing;

use super::paths::DEFAULT_MOUNT_ROOT;
use crate::error::{ZborgError, ZborgResult};
use crate::models::{BackupMode, Dataset, Repository, RemoteLocation, RetentionPolicy};

const KNOWN_KEYS: &[&str] = &[
    "DATASETS",
    "BACKUP_MODE",
    "RECURSIVE",
    "LOCAL_DEST",
    "REMOTE_DEST",
    "PASSPHRASE_FILE",
    "MONTH_KEEP",
    "WEEK_KEEP",
    "DAY_KEEP",
    "COMPRESSION",
    "FILES_CACHE",
    "PRE_HOOK",
    "POST_HOOK",
    "MONO_REPO",
    "CACHE_BASE",
    "REMOTE_PATH",
    "SKIP_LOCAL",
    "LOCAL_READ_ACCESS",
    "MOUNT_ROOT",
    "SETTLE_SECONDS",
    "EXCLUDE_MARKER",
];

/// Read access granted to non-owners on the local repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadAccess {
    /// Group and others may read (and traverse directories)
    Public,
    /// Group and others get no access at all
    Private,
}

/// Validated backup settings
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// Datasets in processing order
    pub datasets: Vec<Dataset>,

    pub mode: BackupMode,

    pub recursive: bool,

    /// Directory holding the local repositories
    pub local_dest: Option<PathBuf>,

    /// Skip the local destination even when configured
    pub skip_local: bool,

    pub remote_dest: Option<RemoteLocation>,

    pub passphrase_file: PathBuf,

    pub retention: RetentionPolicy,

    /// borg `--compression` spec
    pub compression: String,

    /// borg `--files-cache` mode
    pub files_cache: String,

    pub pre_hook: Option<PathBuf>,

    pub post_hook: Option<PathBuf>,

    /// Shared repository name; enables mono-repo archive naming
    pub mono_repo: Option<String>,

    /// Exported to borg as `BORG_BASE_DIR`
    pub cache_base: Option<PathBuf>,

    /// `--remote-path` for borg on the remote host
    pub remote_path: Option<String>,

    pub local_read_access: Option<ReadAccess>,

    /// Private runtime root under which snapshots are mounted
    pub mount_root: PathBuf,

    /// Delay after snapshot create/destroy
    pub settle_seconds: u64,

    /// Marker file that excludes a directory from archives
    pub exclude_marker: String,
}

impl Settings {
    /// Load, parse and validate settings from a file
    pub fn load(path: &Path) -> ZborgResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ZborgError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let settings = Self::parse(&contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings without touching the filesystem
    pub fn parse(contents: &str) -> ZborgResult<Self> {
        let mut values = parse_key_values(contents)?;

        for key in values.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                warn!(key = %key, "ignoring unknown configuration key");
            }
        }

        let mode: BackupMode = required(&values, "BACKUP_MODE")?.parse()?;
        let recursive = parse_flag("RECURSIVE", required(&values, "RECURSIVE")?)?;

        let datasets: Vec<Dataset> = required(&values, "DATASETS")?
            .split_whitespace()
            .map(|name| Dataset::new(name, mode, recursive))
            .collect();
        if datasets.is_empty() {
            return Err(ZborgError::Config("DATASETS lists no datasets".into()));
        }
        if mode == BackupMode::Plain {
            if let Some(ds) = datasets.iter().find(|d| !d.name.starts_with('/')) {
                return Err(ZborgError::Config(format!(
                    "Plain mode datasets must be absolute paths: {}",
                    ds.name
                )));
            }
        }

        let retention = RetentionPolicy {
            month_keep: parse_keep(&values, "MONTH_KEEP")?,
            week_keep: parse_keep(&values, "WEEK_KEEP")?,
            day_keep: parse_keep(&values, "DAY_KEEP")?,
        };

        let remote_dest = optional(&mut values, "REMOTE_DEST")
            .map(|url| RemoteLocation::parse(&url))
            .transpose()?;

        let skip_local = optional(&mut values, "SKIP_LOCAL")
            .map(|v| parse_flag("SKIP_LOCAL", &v))
            .transpose()?
            .unwrap_or(false);

        let local_read_access = match optional(&mut values, "LOCAL_READ_ACCESS").as_deref() {
            None => None,
            Some("public") => Some(ReadAccess::Public),
            Some("private") => Some(ReadAccess::Private),
            Some(other) => {
                return Err(ZborgError::Config(format!(
                    "LOCAL_READ_ACCESS must be 'public' or 'private', got '{}'",
                    other
                )))
            }
        };

        let settle_seconds = match optional(&mut values, "SETTLE_SECONDS") {
            Some(v) => v.parse::<u64>().map_err(|_| {
                ZborgError::Config(format!("SETTLE_SECONDS is not a number: {}", v))
            })?,
            None => 2,
        };

        let settings = Self {
            datasets,
            mode,
            recursive,
            local_dest: optional(&mut values, "LOCAL_DEST").map(PathBuf::from),
            skip_local,
            remote_dest,
            passphrase_file: PathBuf::from(required(&values, "PASSPHRASE_FILE")?),
            retention,
            compression: required(&values, "COMPRESSION")?.to_string(),
            files_cache: required(&values, "FILES_CACHE")?.to_string(),
            pre_hook: optional(&mut values, "PRE_HOOK").map(PathBuf::from),
            post_hook: optional(&mut values, "POST_HOOK").map(PathBuf::from),
            mono_repo: optional(&mut values, "MONO_REPO"),
            cache_base: optional(&mut values, "CACHE_BASE").map(PathBuf::from),
            remote_path: optional(&mut values, "REMOTE_PATH"),
            local_read_access,
            mount_root: optional(&mut values, "MOUNT_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MOUNT_ROOT)),
            settle_seconds,
            exclude_marker: optional(&mut values, "EXCLUDE_MARKER")
                .unwrap_or_else(|| ".nobackup".to_string()),
        };

        check_distinct_names(&settings.datasets, settings.is_mono_repo())?;

        if !settings.local_enabled() && settings.remote_dest.is_none() {
            return Err(ZborgError::Config(
                "No destination: set LOCAL_DEST (without SKIP_LOCAL) and/or REMOTE_DEST".into(),
            ));
        }

        Ok(settings)
    }

    /// Check everything that lives on the filesystem
    ///
    /// Runs before any dataset is touched so a broken configuration aborts
    /// the whole invocation up front.
    pub fn validate(&self) -> ZborgResult<()> {
        if let Some(local) = self.local_dest.as_ref().filter(|_| !self.skip_local) {
            if !local.is_dir() {
                return Err(ZborgError::Config(format!(
                    "LOCAL_DEST does not exist or is not a directory: {}",
                    local.display()
                )));
            }
        }

        if !self.passphrase_file.is_file() {
            return Err(ZborgError::Config(format!(
                "PASSPHRASE_FILE does not exist: {}",
                self.passphrase_file.display()
            )));
        }

        for (key, hook) in [("PRE_HOOK", &self.pre_hook), ("POST_HOOK", &self.post_hook)] {
            if let Some(hook) = hook {
                if !is_executable(hook) {
                    return Err(ZborgError::Config(format!(
                        "{} is not an executable file: {}",
                        key,
                        hook.display()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Whether archives go to the local destination
    pub fn local_enabled(&self) -> bool {
        self.local_dest.is_some() && !self.skip_local
    }

    pub fn is_mono_repo(&self) -> bool {
        self.mono_repo.is_some()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_seconds)
    }

    /// Repository name for a dataset: the mono repo, or one per dataset
    pub fn repository_name(&self, dataset: &Dataset) -> String {
        match &self.mono_repo {
            Some(name) => name.clone(),
            None => dataset.flat_name(),
        }
    }

    /// Every enabled repository for a dataset, local first
    pub fn repositories(&self, dataset: &Dataset) -> Vec<Repository> {
        let name = self.repository_name(dataset);
        let mut repos = Vec::with_capacity(2);
        if let Some(local) = self.local_dest.as_ref().filter(|_| !self.skip_local) {
            repos.push(Repository::local(local, &name));
        }
        if let Some(remote) = &self.remote_dest {
            repos.push(Repository::remote(remote, &name));
        }
        repos
    }

    /// Archive glob restricting prune/listing to one dataset in a shared repository
    pub fn archive_glob(&self, dataset: &Dataset) -> Option<String> {
        self.mono_repo
            .as_ref()
            .map(|_| format!("{}_*", dataset.archive_prefix()))
    }
}

/// Repository passphrase, wiped from memory on drop
pub struct Credentials {
    passphrase: Zeroizing<String>,
}

impl Credentials {
    /// Read the first line of the passphrase file
    pub fn load(path: &Path) -> ZborgResult<Self> {
        let contents = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
            ZborgError::Config(format!(
                "Failed to read passphrase file {}: {}",
                path.display(),
                e
            ))
        })?);
        let first = contents.lines().next().unwrap_or("").trim_end_matches('\r');
        if first.is_empty() {
            return Err(ZborgError::Config(format!(
                "Passphrase file is empty: {}",
                path.display()
            )));
        }
        Ok(Self {
            passphrase: Zeroizing::new(first.to_string()),
        })
    }

    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }

    pub fn passphrase(&self) -> &str {
        &self.passphrase
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

/// Parse a flat `KEY=value` file into a map
///
/// The process environment is neither read into nor written from the map;
/// only `${VAR}` references inside values are expanded.
pub fn parse_key_values(contents: &str) -> ZborgResult<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();

    for item in dotenvy::from_read_iter(contents.as_bytes()) {
        let (key, value) = item.map_err(|e| match e {
            dotenvy::Error::LineParse(line, index) => ZborgError::Config(format!(
                "Invalid line '{}' (at position {})",
                line.trim_end(),
                index
            )),
            other => ZborgError::Config(format!("Failed to parse settings: {}", other)),
        })?;

        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ZborgError::Config(format!("Invalid key '{}'", key)));
        }
        values.insert(key, value);
    }

    Ok(values)
}

/// Every dataset needs its own repository and mount root, and in a shared
/// repository no dataset's archive glob may reach another dataset's archives.
fn check_distinct_names(datasets: &[Dataset], mono_repo: bool) -> ZborgResult<()> {
    for (i, a) in datasets.iter().enumerate() {
        for b in &datasets[i + 1..] {
            if a.flat_name() == b.flat_name() {
                return Err(ZborgError::Config(format!(
                    "Datasets {} and {} map to the same name '{}'",
                    a,
                    b,
                    a.flat_name()
                )));
            }
            if !mono_repo {
                continue;
            }
            let (pa, pb) = (
                format!("{}_", a.archive_prefix()),
                format!("{}_", b.archive_prefix()),
            );
            if pa.starts_with(&pb) || pb.starts_with(&pa) {
                return Err(ZborgError::Config(format!(
                    "Datasets {} and {} cannot share MONO_REPO: their archive names overlap",
                    a, b
                )));
            }
        }
    }
    Ok(())
}

fn required<'a>(values: &'a BTreeMap<String, String>, key: &str) -> ZborgResult<&'a str> {
    match values.get(key) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ZborgError::Config(format!("Missing required setting {}", key))),
    }
}

fn optional(values: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    values.remove(key).filter(|v| !v.is_empty())
}

fn parse_flag(key: &str, value: &str) -> ZborgResult<bool> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Ok(true),
        "no" | "false" | "0" | "off" => Ok(false),
        other => Err(ZborgError::Config(format!(
            "{} must be yes or no, got '{}'",
            key, other
        ))),
    }
}

fn parse_keep(values: &BTreeMap<String, String>, key: &str) -> ZborgResult<u32> {
    let raw = required(values, key)?;
    let keep: u32 = raw
        .parse()
        .map_err(|_| ZborgError::Config(format!("{} is not a number: {}", key, raw)))?;
    if keep == 0 {
        return Err(ZborgError::Config(format!("{} must be at least 1", key)));
    }
    Ok(keep)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
