//! Configuration module for zborg
//!
//! This module provides configuration management including:
//! - Configuration identity resolution
//! - Flat `KEY=value` settings parsing and validation
//! - Repository passphrase loading

pub mod paths;
pub mod settings;

pub use paths::ConfigLocator;
pub use settings::{Credentials, ReadAccess, Settings};
