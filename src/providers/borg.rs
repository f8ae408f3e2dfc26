//! borg archive tool
//!
//! Wraps the borg command line. The repository passphrase is passed through
//! `BORG_PASSPHRASE`; `CACHE_BASE` becomes `BORG_BASE_DIR` and
//! `REMOTE_PATH` is passed as `--remote-path` for remote repositories.

use std::path::{Path, PathBuf};

use tracing::warn;

use super::{ArchiveTool, CreateOptions};
use crate::config::{Credentials, Settings};
use crate::error::{ZborgError, ZborgResult};
use crate::models::{Destination, Repository, RetentionPolicy};
use crate::process::{CommandOutput, CommandRunner, CommandSpec};

/// Encryption mode for new repositories (authenticated, blake2b keyed hashing)
pub const ENCRYPTION_MODE: &str = "repokey-blake2";

/// Highest borg exit code that still means success (1 = warnings)
const BORG_WARNING: i32 = 1;

/// `ArchiveTool` backed by the borg binary
pub struct BorgCli<'a> {
    runner: &'a dyn CommandRunner,
    credentials: &'a Credentials,
    remote_path: Option<String>,
    cache_base: Option<PathBuf>,
}

impl<'a> BorgCli<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &Settings, credentials: &'a Credentials) -> Self {
        Self {
            runner,
            credentials,
            remote_path: settings.remote_path.clone(),
            cache_base: settings.cache_base.clone(),
        }
    }

    fn command(&self, subcommand: &str, repo: &Repository) -> CommandSpec {
        let mut spec = CommandSpec::new("borg")
            .arg(subcommand)
            .env("BORG_PASSPHRASE", self.credentials.passphrase());
        if let Some(base) = &self.cache_base {
            spec = spec.env("BORG_BASE_DIR", base.to_string_lossy());
        }
        if let (Destination::Remote, Some(path)) = (repo.destination, &self.remote_path) {
            spec = spec.arg("--remote-path").arg(path);
        }
        spec
    }

    fn run_tolerating_warnings(&self, spec: &CommandSpec, repo: &Repository) -> ZborgResult<CommandOutput> {
        let output = self.runner.run(spec)?.check_with(spec, BORG_WARNING)?;
        if output.status == BORG_WARNING {
            warn!(repository = %repo, command = %spec, "borg finished with warnings");
        }
        Ok(output)
    }
}

impl ArchiveTool for BorgCli<'_> {
    fn repository_exists(&self, repo: &Repository) -> ZborgResult<bool> {
        let spec = self.command("info", repo).arg(&repo.location);
        let output = self.runner.run(&spec)?;
        if output.success() {
            return Ok(true);
        }
        if output.stderr.contains("does not exist") {
            return Ok(false);
        }
        if output.stderr.contains("is not a valid repository") {
            return Err(ZborgError::Precondition(format!(
                "{} exists but is not a borg repository",
                repo
            )));
        }
        output.check(&spec).map(|_| true)
    }

    fn init(&self, repo: &Repository) -> ZborgResult<()> {
        let spec = self
            .command("init", repo)
            .arg(format!("--encryption={}", ENCRYPTION_MODE))
            .arg(&repo.location)
            .env("BORG_DISPLAY_PASSPHRASE", "no");
        self.runner.run(&spec)?.check(&spec).map(|_| ())
    }

    fn create(
        &self,
        repo: &Repository,
        archive: &str,
        source: &Path,
        options: &CreateOptions,
    ) -> ZborgResult<()> {
        let spec = self
            .command("create", repo)
            .args(["--info", "--stats", "--show-rc"])
            .arg("--compression")
            .arg(&options.compression)
            .arg("--files-cache")
            .arg(&options.files_cache)
            .arg("--exclude-if-present")
            .arg(&options.exclude_marker)
            .arg(repo.archive_ref(archive))
            .arg(".")
            .cwd(source)
            .inherit_output();
        self.run_tolerating_warnings(&spec, repo).map(|_| ())
    }

    fn list(&self, repo: &Repository) -> ZborgResult<Vec<String>> {
        let spec = self.command("list", repo).arg("--short").arg(&repo.location);
        let output = self.runner.run(&spec)?.check(&spec)?;
        Ok(output.lines().map(str::to_string).collect())
    }

    fn delete(&self, repo: &Repository, archive: &str) -> ZborgResult<()> {
        let spec = self.command("delete", repo).arg(repo.archive_ref(archive));
        self.run_tolerating_warnings(&spec, repo).map(|_| ())
    }

    fn prune(
        &self,
        repo: &Repository,
        policy: &RetentionPolicy,
        glob: Option<&str>,
    ) -> ZborgResult<()> {
        let mut spec = self
            .command("prune", repo)
            .args(["--info", "--stats", "--show-rc", "--list"])
            .arg("--keep-daily")
            .arg(policy.day_keep.to_string())
            .arg("--keep-weekly")
            .arg(policy.week_keep.to_string())
            .arg("--keep-monthly")
            .arg(policy.month_keep.to_string());
        if let Some(glob) = glob {
            spec = spec.arg("--glob-archives").arg(glob);
        }
        let spec = spec.arg(&repo.location).inherit_output();
        self.run_tolerating_warnings(&spec, repo).map(|_| ())
    }

    fn compact(&self, repo: &Repository) -> ZborgResult<()> {
        let spec = self.command("compact", repo).arg(&repo.location);
        self.run_tolerating_warnings(&spec, repo).map(|_| ())
    }
}
