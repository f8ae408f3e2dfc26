//! Backup sources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ZborgError;

/// How a dataset is captured before archiving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// Snapshot the ZFS dataset and archive the mounted snapshot
    Snapshot,
    /// Archive the path as it is on disk
    Plain,
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Snapshot => write!(f, "snapshot"),
            Self::Plain => write!(f, "plain"),
        }
    }
}

impl FromStr for BackupMode {
    type Err = ZborgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "plain" => Ok(Self::Plain),
            other => Err(ZborgError::Precondition(format!(
                "Unknown backup mode '{}' (expected 'snapshot' or 'plain')",
                other
            ))),
        }
    }
}

/// A configured backup source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    /// ZFS dataset name (`pool/data`) or, in plain mode, an absolute path
    pub name: String,
    pub mode: BackupMode,
    /// Whether child datasets are snapshotted and mounted too
    pub recursive: bool,
}

impl Dataset {
    pub fn new(name: impl Into<String>, mode: BackupMode, recursive: bool) -> Self {
        Self {
            name: name.into(),
            mode,
            recursive,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.mode == BackupMode::Snapshot
    }

    /// Archive name prefix used in mono-repo mode: every `/` becomes `_`
    pub fn archive_prefix(&self) -> String {
        self.name.replace('/', "_")
    }

    /// Directory-safe name used for per-dataset repositories and mount roots
    pub fn flat_name(&self) -> String {
        self.name.trim_matches('/').replace('/', "_")
    }

    /// Path archived in plain mode
    pub fn plain_path(&self) -> PathBuf {
        PathBuf::from(&self.name)
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
