//! The backup lifecycle engine
//!
//! # Architecture
//!
//! - `scheduler`: picks the month/week/day tier for today
//! - `SnapshotManager`: labelled point-in-time copies
//! - `MountTree`: exposes a snapshot tree as one read-only directory
//! - `BackupExecutor`: provisions repositories and writes archives
//! - `PruneEngine`: snapshot and archive retention
//! - `TidyRecovery`: removes the partial state of an interrupted run
//! - `Lifecycle`: the `run` and `snap` sequences tying these together
//!
//! Every component receives the immutable `Settings` and the tool
//! capabilities it needs at construction.
//!
//! # Example
//!
//! ```rust,ignore
//! use zborg::backup::{Lifecycle, StepPolicy, Tools};
//!
//! let lifecycle = Lifecycle::new(&settings, tools, StepPolicy::FailFast);
//! let report = lifecycle.run(chrono::Local::now().naive_local())?;
//! ```

mod executor;
mod history;
mod lifecycle;
mod mount;
mod permissions;
mod policy;
mod prune;
mod scheduler;
mod snapshot;
mod tidy;

pub use executor::{BackupExecutor, BackupReport, DestinationOutcome};
pub use history::{ArchiveEntry, History};
pub use lifecycle::{DatasetReport, Lifecycle, RunReport, Tools};
pub use mount::{MountBinding, MountHandle, MountTree};
pub use permissions::apply_read_access;
pub use policy::{StepFailure, StepPolicy};
pub use prune::PruneEngine;
pub use scheduler::{select_tier, tier_for_day, TierDecision};
pub use snapshot::SnapshotManager;
pub use tidy::{TidyRecovery, TidyReport};
