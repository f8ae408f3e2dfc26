//! ZFS snapshot provider
//!
//! Snapshots are taken with `zfs snapshot`, mounted with `mount -t zfs` and
//! enumerated with `zfs list`. Active mounts are read from the kernel mount
//! table.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::SnapshotProvider;
use crate::error::{ZborgError, ZborgResult};
use crate::process::{CommandRunner, CommandSpec};

/// Kernel mount table of the current process
pub const MOUNT_TABLE: &str = "/proc/self/mounts";

/// `SnapshotProvider` backed by the zfs and mount command line tools
pub struct ZfsCli<'a> {
    runner: &'a dyn CommandRunner,
    mount_table: PathBuf,
}

impl<'a> ZfsCli<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            runner,
            mount_table: PathBuf::from(MOUNT_TABLE),
        }
    }

    /// Read mounts from a different table (useful for testing)
    pub fn with_mount_table(runner: &'a dyn CommandRunner, mount_table: PathBuf) -> Self {
        Self {
            runner,
            mount_table,
        }
    }

    fn zfs(&self, args: &[&str]) -> ZborgResult<Vec<String>> {
        let spec = CommandSpec::new("zfs").args(args.iter().copied());
        let output = self.runner.run(&spec)?.check(&spec)?;
        Ok(output.lines().map(str::to_string).collect())
    }
}

impl SnapshotProvider for ZfsCli<'_> {
    fn create(&self, dataset: &str, label: &str, recursive: bool) -> ZborgResult<()> {
        let name = format!("{}@{}", dataset, label);
        let mut args = vec!["snapshot"];
        if recursive {
            args.push("-r");
        }
        args.push(&name);
        self.zfs(&args).map(|_| ())
    }

    fn destroy(&self, dataset: &str, label: &str, recursive: bool) -> ZborgResult<()> {
        let name = format!("{}@{}", dataset, label);
        let mut spec = CommandSpec::new("zfs").arg("destroy");
        if recursive {
            spec = spec.arg("-r");
        }
        let spec = spec.arg(&name);

        let output = self.runner.run(&spec)?;
        if !output.success() && is_missing_snapshot(&output.stderr) {
            debug!(snapshot = %name, "already absent");
            return Ok(());
        }
        output.check(&spec).map(|_| ())
    }

    fn list(&self, dataset: &str) -> ZborgResult<Vec<String>> {
        let prefix = format!("{}@", dataset);
        let names = self.zfs(&["list", "-H", "-t", "snapshot", "-o", "name", "-d", "1", dataset])?;
        Ok(names
            .iter()
            .filter_map(|n| n.strip_prefix(&prefix))
            .map(str::to_string)
            .collect())
    }

    fn datasets_with_snapshot(&self, dataset: &str, label: &str) -> ZborgResult<Vec<String>> {
        let suffix = format!("@{}", label);
        let names = self.zfs(&["list", "-H", "-t", "snapshot", "-o", "name", "-r", dataset])?;
        Ok(names
            .iter()
            .filter_map(|n| n.strip_suffix(&suffix))
            .filter(|d| *d == dataset || d.starts_with(&format!("{}/", dataset)))
            .map(str::to_string)
            .collect())
    }

    fn mount(&self, dataset: &str, label: &str, target: &Path) -> ZborgResult<()> {
        let spec = CommandSpec::new("mount")
            .args(["-t", "zfs", "-o", "ro"])
            .arg(format!("{}@{}", dataset, label))
            .arg(target.to_string_lossy());
        self.runner.run(&spec)?.check(&spec).map(|_| ())
    }

    fn unmount(&self, target: &Path) -> ZborgResult<()> {
        let spec = CommandSpec::new("umount").arg(target.to_string_lossy());
        self.runner.run(&spec)?.check(&spec).map(|_| ())
    }

    fn mounts_under(&self, root: &Path) -> ZborgResult<Vec<PathBuf>> {
        let table = fs::read_to_string(&self.mount_table).map_err(|e| {
            ZborgError::Io(format!(
                "Failed to read mount table {}: {}",
                self.mount_table.display(),
                e
            ))
        })?;
        Ok(parse_mount_table(&table)
            .into_iter()
            .filter(|p| p.starts_with(root) && p != root)
            .collect())
    }
}

fn is_missing_snapshot(stderr: &str) -> bool {
    stderr.contains("could not find any snapshots to destroy") || stderr.contains("does not exist")
}

/// Mount points listed in a `/proc/mounts`-style table
pub fn parse_mount_table(table: &str) -> Vec<PathBuf> {
    table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(unescape_mount_field(field)))
        .collect()
}

/// Undo the kernel's octal escaping of spaces, tabs, newlines and backslashes
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}
