//! Snapshot-level diff: compare two flattened trees file by file.

use std::collections::BTreeSet;

use convlog_store::{ObjectStore, Snapshot};
use convlog_types::ObjectId;

use crate::error::DiffResult;

/// The result of comparing two snapshots, ordered by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub changes: Vec<TreeChange>,
}

impl TreeDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeChange> {
        self.changes.iter()
    }

    /// Every touched path.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(TreeChange::path)
    }

    /// The change at `path`, if any.
    pub fn get(&self, path: &str) -> Option<&TreeChange> {
        self.changes.iter().find(|c| c.path() == path)
    }

    pub fn added(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(|c| matches!(c, TreeChange::Added { .. }))
            .map(TreeChange::path)
    }

    pub fn deleted(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(|c| matches!(c, TreeChange::Deleted { .. }))
            .map(TreeChange::path)
    }

    /// The first change whose path fails `allowed`.
    pub fn find_outside(&self, mut allowed: impl FnMut(&TreeChange) -> bool) -> Option<&TreeChange> {
        self.changes.iter().find(|c| !allowed(c))
    }
}

impl<'a> IntoIterator for &'a TreeDiff {
    type Item = &'a TreeChange;
    type IntoIter = std::slice::Iter<'a, TreeChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// A single file-level change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeChange {
    Added { path: String, new_id: ObjectId },
    Deleted { path: String, old_id: ObjectId },
    Modified {
        path: String,
        old_id: ObjectId,
        new_id: ObjectId,
    },
}

impl TreeChange {
    pub fn path(&self) -> &str {
        match self {
            Self::Added { path, .. } | Self::Deleted { path, .. } | Self::Modified { path, .. } => {
                path
            }
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added { .. })
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }

    pub fn is_modified(&self) -> bool {
        matches!(self, Self::Modified { .. })
    }

    /// Blob id on the new side, if the file still exists.
    pub fn new_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Added { new_id, .. } | Self::Modified { new_id, .. } => Some(new_id),
            Self::Deleted { .. } => None,
        }
    }

    /// Blob id on the old side, if the file existed.
    pub fn old_id(&self) -> Option<&ObjectId> {
        match self {
            Self::Deleted { old_id, .. } | Self::Modified { old_id, .. } => Some(old_id),
            Self::Added { .. } => None,
        }
    }
}

/// Compare two snapshots.
pub fn diff_snapshots(old: &Snapshot, new: &Snapshot) -> TreeDiff {
    let paths: BTreeSet<&String> = old.files().keys().chain(new.files().keys()).collect();
    let changes = paths
        .into_iter()
        .filter_map(|path| match (old.get(path), new.get(path)) {
            (None, Some(new_id)) => Some(TreeChange::Added {
                path: path.clone(),
                new_id: *new_id,
            }),
            (Some(old_id), None) => Some(TreeChange::Deleted {
                path: path.clone(),
                old_id: *old_id,
            }),
            (Some(old_id), Some(new_id)) if old_id != new_id => Some(TreeChange::Modified {
                path: path.clone(),
                old_id: *old_id,
                new_id: *new_id,
            }),
            _ => None,
        })
        .collect();
    TreeDiff { changes }
}

/// Compare two trees read from the store.
///
/// `old_tree` is `None` for the initial commit, which is compared against
/// an empty tree.
pub fn diff_trees(
    store: &dyn ObjectStore,
    old_tree: Option<&ObjectId>,
    new_tree: &ObjectId,
) -> DiffResult<TreeDiff> {
    let old = match old_tree {
        Some(id) => Snapshot::load(store, id)?,
        None => Snapshot::new(),
    };
    let new = Snapshot::load(store, new_tree)?;
    Ok(diff_snapshots(&old, &new))
}
