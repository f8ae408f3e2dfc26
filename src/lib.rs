//! zborg - tiered ZFS snapshot and borg archive backups
//!
//! Each run takes one point-in-time copy per dataset, classified into a
//! month, week or day tier, archives it into encrypted deduplicating
//! repositories on a local and/or remote destination, and then enforces
//! per-tier retention on both the snapshots and the archives.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration file resolution and parsing
//! - `error`: Custom error types
//! - `models`: Tiers, labels, datasets and repositories
//! - `process`: External command execution
//! - `providers`: Capability traits and their zfs/borg/ssh implementations
//! - `backup`: The lifecycle engine
//! - `hooks`: Per-dataset pre/post scripts
//! - `cli`: Subcommand handlers and summaries
//! - `logging`: tracing subscriber setup
//!
//! # Example
//!
//! ```rust,ignore
//! use zborg::cli::{handle_run_command, Session};
//!
//! let session = Session::open("nightly")?;
//! handle_run_command(&session)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod models;
pub mod process;
pub mod providers;

#[cfg(test)]
pub(crate) mod testing;

pub use error::ZborgError;
