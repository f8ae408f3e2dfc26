//! Read-only mounting of a snapshot tree
//!
//! A recursive snapshot covers a dataset and its descendants. Each one is
//! mounted at its path relative to the root, under
//! `<mount_root>/<flattened dataset name>`, so archiving that single
//! directory captures the whole tree as it looked at snapshot time.
//! Parents are mounted before their children and unmounted after them.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ZborgError, ZborgResult};
use crate::models::Dataset;
use crate::providers::SnapshotProvider;

/// One mounted dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountBinding {
    pub dataset: String,
    pub path: PathBuf,
}

/// The mounted view of one snapshot tree
///
/// Must be handed back to `MountTree::unmount`.
#[derive(Debug)]
#[must_use = "mounted snapshots must be unmounted"]
pub struct MountHandle {
    label: String,
    root: PathBuf,
    /// In mount order (parents first)
    bindings: Vec<MountBinding>,
}

impl MountHandle {
    /// Directory holding the whole tree; archive from here
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn bindings(&self) -> &[MountBinding] {
        &self.bindings
    }
}

/// A dataset and its descendants
#[derive(Debug)]
struct DatasetNode {
    name: String,
    children: Vec<DatasetNode>,
}

impl DatasetNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
        }
    }

    /// Insert `name` under its nearest ancestor already in the tree
    fn insert(&mut self, name: &str) {
        let parent = self.children.iter_mut().find(|child| {
            name.strip_prefix(child.name.as_str())
                .map_or(false, |rest| rest.starts_with('/'))
        });
        match parent {
            Some(child) => child.insert(name),
            None => self.children.push(DatasetNode::new(name)),
        }
    }

    /// Names with every parent before its children
    fn pre_order<'n>(&'n self, out: &mut Vec<&'n str>) {
        out.push(&self.name);
        for child in &self.children {
            child.pre_order(out);
        }
    }
}

/// Build the tree rooted at `root` out of `names`
///
/// Names outside the root's subtree are dropped. Shorter names are inserted
/// first so that every parent is in place before its children.
fn build_tree(root: &str, names: &[String]) -> DatasetNode {
    let prefix = format!("{}/", root);
    let mut descendants: Vec<&String> = names.iter().filter(|n| n.starts_with(&prefix)).collect();
    descendants.sort_by(|a, b| {
        a.matches('/')
            .count()
            .cmp(&b.matches('/').count())
            .then_with(|| a.cmp(b))
    });

    let mut tree = DatasetNode::new(root);
    for name in descendants {
        tree.insert(name);
    }
    tree
}

/// Mounts and unmounts snapshot trees below a mount root
pub struct MountTree<'a> {
    provider: &'a dyn SnapshotProvider,
    mount_root: PathBuf,
}

impl<'a> MountTree<'a> {
    pub fn new(provider: &'a dyn SnapshotProvider, mount_root: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            mount_root: mount_root.into(),
        }
    }

    /// Where the tree of `dataset` is mounted
    pub fn root_for(&self, dataset: &Dataset) -> PathBuf {
        self.mount_root.join(dataset.flat_name())
    }

    /// Mount `dataset@label`, and every descendant holding the same label
    /// when the dataset is recursive
    ///
    /// On failure everything mounted so far is unmounted again before the
    /// error is returned.
    pub fn mount(&self, dataset: &Dataset, label: &str) -> ZborgResult<MountHandle> {
        let mount_failed = |reason: String| ZborgError::MountFailed {
            dataset: dataset.name.clone(),
            label: label.to_string(),
            reason,
        };

        let names = if dataset.recursive {
            self.provider
                .datasets_with_snapshot(&dataset.name, label)
                .map_err(|e| mount_failed(e.to_string()))?
        } else {
            vec![dataset.name.clone()]
        };
        if !names.iter().any(|n| *n == dataset.name) {
            return Err(mount_failed("snapshot does not exist".into()));
        }

        let tree = build_tree(&dataset.name, &names);
        let mut order = Vec::new();
        tree.pre_order(&mut order);

        let root = self.root_for(dataset);
        let mut bindings: Vec<MountBinding> = Vec::with_capacity(order.len());
        for name in order {
            let path = match relative_path(&dataset.name, name) {
                Some(rel) => root.join(rel),
                None => root.clone(),
            };

            let mounted = fs::create_dir_all(&path)
                .map_err(|e| {
                    ZborgError::Io(format!(
                        "Failed to create mount point {}: {}",
                        path.display(),
                        e
                    ))
                })
                .and_then(|_| self.provider.mount(name, label, &path));

            if let Err(e) = mounted {
                warn!(dataset = name, error = %e, "mount failed, unwinding");
                self.unwind(&bindings);
                return Err(mount_failed(format!("{}: {}", name, e)));
            }
            debug!(dataset = name, path = %path.display(), "mounted");
            bindings.push(MountBinding {
                dataset: name.to_string(),
                path,
            });
        }

        info!(dataset = %dataset, label = label, mounts = bindings.len(), root = %root.display(), "snapshot tree mounted");
        Ok(MountHandle {
            label: label.to_string(),
            root,
            bindings,
        })
    }

    /// Unmount a tree, children before parents
    ///
    /// Every binding is attempted; the error lists the ones left behind.
    pub fn unmount(&self, handle: MountHandle) -> ZborgResult<()> {
        let stuck = self.unwind(&handle.bindings);
        if stuck.is_empty() {
            info!(root = %handle.root.display(), label = handle.label(), "snapshot tree unmounted");
            Ok(())
        } else {
            Err(ZborgError::UnmountFailed(
                stuck
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            ))
        }
    }

    /// Unmount `bindings` in reverse and remove their mount points
    ///
    /// Returns the paths that could not be unmounted.
    fn unwind(&self, bindings: &[MountBinding]) -> Vec<PathBuf> {
        let mut stuck = Vec::new();
        for binding in bindings.iter().rev() {
            match self.provider.unmount(&binding.path) {
                Ok(()) => {
                    debug!(path = %binding.path.display(), "unmounted");
                    // Only succeeds for directories we created and left empty
                    let _ = fs::remove_dir(&binding.path);
                }
                Err(e) => {
                    warn!(path = %binding.path.display(), error = %e, "unmount failed");
                    stuck.push(binding.path.clone());
                }
            }
        }
        stuck
    }
}

/// Path of `name` relative to `root`, `None` for the root itself
fn relative_path<'n>(root: &str, name: &'n str) -> Option<&'n str> {
    name.strip_prefix(root)
        .map(|rest| rest.trim_start_matches('/'))
        .filter(|rest| !rest.is_empty())
}
