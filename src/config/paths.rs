//! Configuration file resolution for zborg
//!
//! Subcommands take a configuration *identity*: either a path to a config
//! file, or a bare name looked up as `<name>.conf` in the search directories.
//!
//! ## Search Order
//!
//! 1. The identity itself, if it names an existing file
//! 2. `ZBORG_CONFIG_DIR` environment variable (if set)
//! 3. `/etc/zborg`
//! 4. The per-user config directory (`~/.config/zborg` on Linux)

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::{ZborgError, ZborgResult};

/// System-wide configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/zborg";

/// Default private runtime mount root
pub const DEFAULT_MOUNT_ROOT: &str = "/run/zborg";

/// Resolves configuration identities to files
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    search_dirs: Vec<PathBuf>,
}

impl ConfigLocator {
    /// Create a locator with the default search directories
    pub fn new() -> Self {
        let mut search_dirs = Vec::new();
        if let Ok(custom) = std::env::var("ZBORG_CONFIG_DIR") {
            search_dirs.push(PathBuf::from(custom));
        }
        search_dirs.push(PathBuf::from(SYSTEM_CONFIG_DIR));
        if let Some(dirs) = ProjectDirs::from("", "", "zborg") {
            search_dirs.push(dirs.config_dir().to_path_buf());
        }
        Self { search_dirs }
    }

    /// Create a locator with explicit search directories (useful for testing)
    pub fn with_search_dirs(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.search_dirs
    }

    /// Resolve a configuration identity to an existing file
    ///
    /// # Errors
    ///
    /// Returns a not-found error when no candidate exists.
    pub fn resolve(&self, identity: &str) -> ZborgResult<PathBuf> {
        let direct = Path::new(identity);
        if direct.is_file() {
            return Ok(direct.to_path_buf());
        }

        // Something that looks like a path is never searched for.
        if identity.contains(std::path::MAIN_SEPARATOR) || identity.is_empty() {
            return Err(ZborgError::config_not_found(identity));
        }

        self.search_dirs
            .iter()
            .flat_map(|dir| [dir.join(format!("{}.conf", identity)), dir.join(identity)])
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| ZborgError::config_not_found(identity))
    }
}

impl Default for ConfigLocator {
    fn default() -> Self {
        Self::new()
    }
}
