//! Archive creation against every enabled destination
//!
//! Each destination is provisioned on first use (remote base directory, then
//! an encrypted repository) and then receives one archive. Destinations are
//! independent: a failure at one does not stop the other, but any failure
//! fails the dataset once both have been tried.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use super::permissions::apply_read_access;
use crate::config::Settings;
use crate::error::{ZborgError, ZborgResult};
use crate::models::{archive_name, Dataset, Destination, Repository};
use crate::providers::{ArchiveTool, CreateOptions, RemoteShell};

/// Result of archiving to one destination
#[derive(Debug)]
pub struct DestinationOutcome {
    pub repository: Repository,
    pub result: ZborgResult<()>,
}

/// Result of archiving one dataset to all destinations
#[derive(Debug)]
pub struct BackupReport {
    pub dataset: String,
    pub archive: String,
    pub outcomes: Vec<DestinationOutcome>,
}

impl BackupReport {
    pub fn succeeded(&self) -> Vec<Destination> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| o.repository.destination)
            .collect()
    }

    /// Destinations that succeeded, or the first failure
    pub fn into_result(self) -> ZborgResult<Vec<Destination>> {
        let mut succeeded = Vec::with_capacity(self.outcomes.len());
        for outcome in self.outcomes {
            outcome.result?;
            succeeded.push(outcome.repository.destination);
        }
        Ok(succeeded)
    }
}

/// Creates archives and provisions repositories
pub struct BackupExecutor<'a> {
    settings: &'a Settings,
    archives: &'a dyn ArchiveTool,
    remote: &'a dyn RemoteShell,
}

impl<'a> BackupExecutor<'a> {
    pub fn new(settings: &'a Settings, archives: &'a dyn ArchiveTool, remote: &'a dyn RemoteShell) -> Self {
        Self {
            settings,
            archives,
            remote,
        }
    }

    fn create_options(&self) -> CreateOptions {
        CreateOptions {
            compression: self.settings.compression.clone(),
            files_cache: self.settings.files_cache.clone(),
            exclude_marker: self.settings.exclude_marker.clone(),
        }
    }

    /// Archive everything under `source` as `label` to every enabled destination
    ///
    /// Local is attempted first, then remote; both are always attempted.
    pub fn run_backup(&self, dataset: &Dataset, source: &Path, label: &str) -> BackupReport {
        let archive = archive_name(self.settings.is_mono_repo(), dataset, label);
        let options = self.create_options();

        let outcomes = self
            .settings
            .repositories(dataset)
            .into_iter()
            .map(|repository| {
                let result = self
                    .backup_to(&repository, &archive, source, &options)
                    .map_err(|e| match e {
                        ZborgError::Precondition(_) => e,
                        other => ZborgError::Backup {
                            dataset: dataset.name.clone(),
                            destination: repository.destination.to_string(),
                            reason: other.to_string(),
                        },
                    });
                match &result {
                    Ok(()) => info!(dataset = %dataset, repository = %repository, archive = %archive, "archive created"),
                    Err(e) => error!(dataset = %dataset, repository = %repository, error = %e, "archive failed"),
                }
                DestinationOutcome { repository, result }
            })
            .collect();

        BackupReport {
            dataset: dataset.name.clone(),
            archive,
            outcomes,
        }
    }

    fn backup_to(
        &self,
        repository: &Repository,
        archive: &str,
        source: &Path,
        options: &CreateOptions,
    ) -> ZborgResult<()> {
        self.provision(repository)?;
        self.archives.create(repository, archive, source, options)?;

        if let (Destination::Local, Some(access)) =
            (repository.destination, self.settings.local_read_access)
        {
            apply_read_access(&PathBuf::from(&repository.location), access)?;
        }
        Ok(())
    }

    /// Make sure the repository exists, creating it (and the remote base
    /// directory) when absent
    pub fn provision(&self, repository: &Repository) -> ZborgResult<()> {
        let provision_err = |e: ZborgError| match e {
            ZborgError::Precondition(_) => e,
            other => ZborgError::Provision(format!("{}: {}", repository, other)),
        };

        if self.archives.repository_exists(repository).map_err(provision_err)? {
            return Ok(());
        }

        if repository.destination == Destination::Remote {
            if let Some(base) = &self.settings.remote_dest {
                if !self.remote.directory_exists(base).map_err(provision_err)? {
                    self.remote.create_directory(base).map_err(provision_err)?;
                    info!(host = %base.host, path = %base.shell_path(), "remote base directory created");
                }
            }
        }

        self.archives.init(repository).map_err(provision_err)?;
        info!(repository = %repository, "repository initialised");
        Ok(())
    }
}
