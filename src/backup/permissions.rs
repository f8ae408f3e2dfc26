//! Read access adjustment for local repositories

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::config::ReadAccess;
use crate::error::{ZborgError, ZborgResult};

/// New mode bits for one entry
fn adjusted_mode(mode: u32, is_dir: bool, access: ReadAccess) -> u32 {
    match access {
        ReadAccess::Public if is_dir => mode | 0o055,
        ReadAccess::Public => mode | 0o044,
        ReadAccess::Private => mode & !0o077,
    }
}

/// Apply `access` to everything under `root`, `root` included
///
/// Symlinks are left alone.
pub fn apply_read_access(root: &Path, access: ReadAccess) -> ZborgResult<()> {
    let mut changed = 0usize;
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| {
            ZborgError::Io(format!("Failed to walk {}: {}", root.display(), e))
        })?;
        if entry.path_is_symlink() {
            continue;
        }
        let metadata = entry.metadata().map_err(|e| {
            ZborgError::Io(format!("Failed to stat {}: {}", entry.path().display(), e))
        })?;

        let mode = metadata.permissions().mode();
        let wanted = adjusted_mode(mode, metadata.is_dir(), access);
        if wanted != mode {
            fs::set_permissions(entry.path(), fs::Permissions::from_mode(wanted)).map_err(|e| {
                ZborgError::Io(format!(
                    "Failed to set permissions on {}: {}",
                    entry.path().display(),
                    e
                ))
            })?;
            changed += 1;
        }
    }
    debug!(root = %root.display(), ?access, changed, "read access adjusted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn mode_of(path: &Path) -> u32 {
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[test]
    fn test_adjusted_mode() {
        assert_eq!(adjusted_mode(0o700, true, ReadAccess::Public), 0o755);
        assert_eq!(adjusted_mode(0o600, false, ReadAccess::Public), 0o644);
        assert_eq!(adjusted_mode(0o755, true, ReadAccess::Private), 0o700);
        assert_eq!(adjusted_mode(0o644, false, ReadAccess::Private), 0o600);
    }

    #[test]
    fn test_public_then_private() {
        let temp_dir = TempDir::new().unwrap();
        let repo = temp_dir.path().join("pool_data");
        fs::create_dir_all(repo.join("data/0")).unwrap();
        let file = repo.join("data/0/1");
        fs::write(&file, b"segment").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o600)).unwrap();
        fs::set_permissions(repo.join("data"), fs::Permissions::from_mode(0o700)).unwrap();

        apply_read_access(&repo, ReadAccess::Public).unwrap();
        assert_eq!(mode_of(&file), 0o644);
        assert_eq!(mode_of(&repo.join("data")), 0o755);

        apply_read_access(&repo, ReadAccess::Private).unwrap();
        assert_eq!(mode_of(&file), 0o600);
        assert_eq!(mode_of(&repo.join("data")), 0o700);
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = apply_read_access(&temp_dir.path().join("absent"), ReadAccess::Public).unwrap_err();
        assert!(matches!(err, ZborgError::Io(_)));
    }
}
