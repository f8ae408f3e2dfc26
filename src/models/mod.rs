//! Core data models for zborg
//!
//! This module contains the data structures shared by every stage of the
//! backup lifecycle: retention tiers, snapshot/archive labels, datasets and
//! the repositories they are shipped to.

pub mod dataset;
pub mod label;
pub mod repository;
pub mod tier;

pub use dataset::{BackupMode, Dataset};
pub use label::Label;
pub use repository::{archive_name, Destination, RemoteLocation, Repository};
pub use tier::{RetentionPolicy, Tier};
