//! CLI command handlers
//!
//! This module bridges the clap argument parsing with the lifecycle engine:
//! it resolves the configuration, wires the real tool implementations
//! together and prints summaries.

pub mod check;
pub mod run;
pub mod summary;
pub mod tidy;

use std::path::PathBuf;

use tracing::debug;

use crate::backup::Tools;
use crate::config::{ConfigLocator, Credentials, Settings};
use crate::error::ZborgResult;
use crate::process::CommandRunner;
use crate::providers::{BorgCli, SshShell, ZfsCli};

pub use check::handle_check_command;
pub use run::{handle_run_command, handle_snap_command};
pub use tidy::handle_tidy_command;

/// A loaded configuration, ready to act on
pub struct Session {
    pub config_path: PathBuf,
    pub settings: Settings,
}

impl Session {
    /// Resolve `identity` and load its settings
    pub fn open(identity: &str) -> ZborgResult<Self> {
        Self::open_with(&ConfigLocator::new(), identity)
    }

    pub fn open_with(locator: &ConfigLocator, identity: &str) -> ZborgResult<Self> {
        let config_path = locator.resolve(identity)?;
        debug!(path = %config_path.display(), "loading configuration");
        let settings = Settings::load(&config_path)?;
        Ok(Self {
            config_path,
            settings,
        })
    }

    /// Read the repository passphrase
    pub fn credentials(&self) -> ZborgResult<Credentials> {
        Credentials::load(&self.settings.passphrase_file)
    }
}

/// The real zfs, borg and ssh tools, all running through one runner
pub struct SystemTools<'a> {
    runner: &'a dyn CommandRunner,
    zfs: ZfsCli<'a>,
    borg: BorgCli<'a>,
    ssh: SshShell<'a>,
}

impl<'a> SystemTools<'a> {
    pub fn new(runner: &'a dyn CommandRunner, settings: &Settings, credentials: &'a Credentials) -> Self {
        Self {
            runner,
            zfs: ZfsCli::new(runner),
            borg: BorgCli::new(runner, settings, credentials),
            ssh: SshShell::new(runner),
        }
    }

    pub fn tools(&self) -> Tools<'_> {
        Tools {
            snapshots: &self.zfs,
            archives: &self.borg,
            remote: &self.ssh,
            runner: self.runner,
        }
    }
}
