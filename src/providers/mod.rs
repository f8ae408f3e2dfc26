//! Capability interfaces for the external tools zborg drives
//!
//! The lifecycle engine only ever talks to these traits:
//!
//! - `SnapshotProvider`: point-in-time copies of a dataset tree, and mounting
//!   a named copy as a regular path (ZFS + mount(8))
//! - `ArchiveTool`: encrypted, deduplicating archive repositories (borg)
//! - `RemoteShell`: directory checks/creation on the remote host (ssh)
//!
//! The real implementations live in the submodules and run through a
//! `CommandRunner`; tests substitute in-memory fakes.

pub mod borg;
pub mod ssh;
pub mod zfs;

use std::path::{Path, PathBuf};

use crate::error::ZborgResult;
use crate::models::{RemoteLocation, Repository, RetentionPolicy};

pub use borg::BorgCli;
pub use ssh::SshShell;
pub use zfs::ZfsCli;

/// Point-in-time copies of a hierarchical dataset tree
pub trait SnapshotProvider {
    /// Take `dataset@label`, and the same label on every descendant when `recursive`
    fn create(&self, dataset: &str, label: &str, recursive: bool) -> ZborgResult<()>;

    /// Destroy `dataset@label` (and descendants); an absent copy is not an error
    fn destroy(&self, dataset: &str, label: &str, recursive: bool) -> ZborgResult<()>;

    /// Names of the copies taken of `dataset` itself (the part after `@`)
    fn list(&self, dataset: &str) -> ZborgResult<Vec<String>>;

    /// `dataset` and every descendant that has a copy named `label`
    fn datasets_with_snapshot(&self, dataset: &str, label: &str) -> ZborgResult<Vec<String>>;

    /// Mount `dataset@label` read-only at an existing directory
    fn mount(&self, dataset: &str, label: &str, target: &Path) -> ZborgResult<()>;

    fn unmount(&self, target: &Path) -> ZborgResult<()>;

    /// Mount points strictly below `root`
    fn mounts_under(&self, root: &Path) -> ZborgResult<Vec<PathBuf>>;
}

/// Fixed options for archive creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    pub compression: String,
    pub files_cache: String,
    pub exclude_marker: String,
}

/// Encrypted, deduplicating archive repositories
pub trait ArchiveTool {
    /// Whether the repository exists
    ///
    /// Something at the location that is not a usable repository is a
    /// `Precondition` error rather than `false`.
    fn repository_exists(&self, repo: &Repository) -> ZborgResult<bool>;

    /// Initialise a new encrypted repository
    fn init(&self, repo: &Repository) -> ZborgResult<()>;

    /// Archive everything under `source` as `archive`
    fn create(
        &self,
        repo: &Repository,
        archive: &str,
        source: &Path,
        options: &CreateOptions,
    ) -> ZborgResult<()>;

    /// Archive names in the repository
    fn list(&self, repo: &Repository) -> ZborgResult<Vec<String>>;

    fn delete(&self, repo: &Repository, archive: &str) -> ZborgResult<()>;

    /// Calendar-bucket retention: daily/weekly/monthly counts applied together
    fn prune(
        &self,
        repo: &Repository,
        policy: &RetentionPolicy,
        glob: Option<&str>,
    ) -> ZborgResult<()>;

    /// Free space left behind by deletes and prunes
    fn compact(&self, repo: &Repository) -> ZborgResult<()>;
}

/// Minimal remote shell access for provisioning
pub trait RemoteShell {
    fn directory_exists(&self, location: &RemoteLocation) -> ZborgResult<bool>;

    /// `mkdir -p` the base directory of `location`
    fn create_directory(&self, location: &RemoteLocation) -> ZborgResult<()>;
}

/// Quote a string for a POSIX shell
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/srv/borg"), "'/srv/borg'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
