//! Custom error types for zborg
//!
//! This module defines the error hierarchy for the backup lifecycle using
//! thiserror. Errors fall into three broad groups: configuration errors
//! (fatal before any dataset is touched), precondition errors (fatal for a
//! dataset) and step failures (snapshot, mount, archive, prune, provisioning
//! or hook failures) whose handling depends on the active `StepPolicy`.

use thiserror::Error;

/// The main error type for zborg operations
#[derive(Error, Debug)]
pub enum ZborgError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// A dataset or repository is not in a state we can work with
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An external command exited unsuccessfully
    #[error("Command `{program}` failed with status {status}: {stderr}")]
    Command {
        program: String,
        status: i32,
        stderr: String,
    },

    /// Point-in-time copy creation failed
    #[error("Failed to create snapshot {dataset}@{label}: {reason}")]
    CreateFailed {
        dataset: String,
        label: String,
        reason: String,
    },

    /// Mounting a snapshot (or one of its descendants) failed
    #[error("Failed to mount {dataset}@{label}: {reason}")]
    MountFailed {
        dataset: String,
        label: String,
        reason: String,
    },

    /// Unmounting left bindings behind
    #[error("Failed to unmount {0}")]
    UnmountFailed(String),

    /// Archive creation against a destination failed
    #[error("Backup of {dataset} to {destination} failed: {reason}")]
    Backup {
        dataset: String,
        destination: String,
        reason: String,
    },

    /// Pruning failed
    #[error("Prune error: {0}")]
    Prune(String),

    /// Repository provisioning failed
    #[error("Provisioning error: {0}")]
    Provision(String),

    /// A pre/post hook script failed
    #[error("Hook {hook} failed for {dataset}: {reason}")]
    Hook {
        hook: String,
        dataset: String,
        reason: String,
    },

    /// Today's copy already exists, the run is not re-entrant
    #[error("{dataset} already has a copy from today ({label}); run `zborg tidy` first")]
    PartialDay { dataset: String, label: String },

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },
}

impl ZborgError {
    /// Create a "not found" error for snapshots
    pub fn snapshot_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Snapshot",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for configuration files
    pub fn config_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Configuration",
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this error was caused by an already existing copy from today
    pub fn is_partial_day(&self) -> bool {
        matches!(self, Self::PartialDay { .. })
    }
}

impl From<std::io::Error> for ZborgError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ZborgError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for zborg operations
pub type ZborgResult<T> = Result<T, ZborgError>;
