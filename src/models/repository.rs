//! Backup destinations and archive naming

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use super::dataset::Dataset;
use crate::error::{ZborgError, ZborgResult};

/// Which of the two destinations a repository lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Local,
    Remote,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A remote destination reachable over ssh
///
/// Accepts borg's two spellings: `ssh://[user@]host[:port]/path` and the
/// scp-like `[user@]host:path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLocation {
    /// The connection string exactly as configured
    pub url: String,
    /// `[user@]host` passed to ssh
    pub host: String,
    pub port: Option<u16>,
    /// Base directory on the remote host
    pub path: String,
}

impl RemoteLocation {
    pub fn parse(url: &str) -> ZborgResult<Self> {
        let url = url.trim();
        let invalid = || ZborgError::Config(format!("Invalid remote destination: {}", url));

        if let Some(rest) = url.strip_prefix("ssh://") {
            let (authority, path) = match rest.find('/') {
                Some(idx) => (&rest[..idx], &rest[idx..]),
                None => (rest, ""),
            };
            let (host, port) = match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
                None => (authority, None),
            };
            if host.is_empty() || host.ends_with('@') {
                return Err(invalid());
            }
            return Ok(Self {
                url: url.to_string(),
                host: host.to_string(),
                port,
                path: path.to_string(),
            });
        }

        match url.split_once(':') {
            Some((host, path)) if !host.is_empty() && !host.contains('/') => Ok(Self {
                url: url.to_string(),
                host: host.to_string(),
                port: None,
                path: path.to_string(),
            }),
            _ => Err(invalid()),
        }
    }

    /// Base directory as a path for a shell on the remote host
    ///
    /// borg's `/./dir` and `/~/dir` forms mean "relative to the login
    /// directory", which is what a relative path gives ssh.
    pub fn shell_path(&self) -> String {
        let path = self
            .path
            .strip_prefix("/./")
            .or_else(|| self.path.strip_prefix("/~/"))
            .unwrap_or(&self.path);
        if path.is_empty() {
            ".".to_string()
        } else {
            path.to_string()
        }
    }

    /// Repository location for a repository called `name` under this base
    pub fn join(&self, name: &str) -> String {
        if self.url.ends_with(':') {
            format!("{}{}", self.url, name)
        } else {
            format!("{}/{}", self.url.trim_end_matches('/'), name)
        }
    }
}

/// A borg repository on one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub destination: Destination,
    /// Location handed to borg (a path or a remote URL)
    pub location: String,
}

impl Repository {
    pub fn local(base: &Path, name: &str) -> Self {
        Self {
            destination: Destination::Local,
            location: base.join(name).to_string_lossy().to_string(),
        }
    }

    pub fn remote(base: &RemoteLocation, name: &str) -> Self {
        Self {
            destination: Destination::Remote,
            location: base.join(name),
        }
    }

    /// `repo::archive` reference understood by borg
    pub fn archive_ref(&self, archive: &str) -> String {
        format!("{}::{}", self.location, archive)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.destination)
    }
}

/// Archive name for a dataset's label
///
/// Multi-repo: the label itself. Mono-repo: `<dataset with '/' → '_'>_<label>`.
/// Existing repositories depend on this being exact.
pub fn archive_name(mono_repo: bool, dataset: &Dataset, label: &str) -> String {
    if mono_repo {
        format!("{}_{}", dataset.archive_prefix(), label)
    } else {
        label.to_string()
    }
}

/// Recover the label part of an archive name belonging to `dataset`
pub fn label_of_archive<'a>(mono_repo: bool, dataset: &Dataset, archive: &'a str) -> Option<&'a str> {
    if mono_repo {
        archive
            .strip_prefix(&dataset.archive_prefix())
            .and_then(|rest| rest.strip_prefix('_'))
    } else {
        Some(archive)
    }
}
