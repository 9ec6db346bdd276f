//! Path-level three-way merge of flattened trees.

use std::collections::BTreeSet;

use convlog_membership::paths::PROFILE;
use convlog_store::Snapshot;
use convlog_types::ObjectId;

use crate::error::{MergeError, MergeResult};

/// Which side of a merge a resolved path was taken from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Ours,
    Theirs,
}

/// Result of merging two snapshots against their base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeMerge {
    pub snapshot: Snapshot,
    /// Conflicting paths settled by policy, with the side that won.
    pub resolved: Vec<(String, Side)>,
}

/// Merge `ours` and `theirs` against `base`.
///
/// A path changed on one side only takes that side's version. A path
/// changed identically on both sides is kept. When both sides changed
/// `profile.vcf` differently, the side whose commit id is greater wins,
/// which makes the result independent of who runs the merge. Any other
/// path changed differently on both sides is a conflict.
pub fn merge_snapshots(
    base: &Snapshot,
    ours: &Snapshot,
    theirs: &Snapshot,
    ours_id: &ObjectId,
    theirs_id: &ObjectId,
) -> MergeResult<TreeMerge> {
    let paths: BTreeSet<&str> = base
        .files()
        .keys()
        .chain(ours.files().keys())
        .chain(theirs.files().keys())
        .map(String::as_str)
        .collect();

    let mut snapshot = Snapshot::new();
    let mut resolved = Vec::new();
    let mut conflicts = Vec::new();

    for path in paths {
        let b = base.get(path);
        let o = ours.get(path);
        let t = theirs.get(path);

        let chosen = if o == t || t == b {
            o
        } else if o == b {
            t
        } else if path == PROFILE {
            let side = if theirs_id > ours_id { Side::Theirs } else { Side::Ours };
            resolved.push((path.to_string(), side));
            match side {
                Side::Ours => o,
                Side::Theirs => t,
            }
        } else {
            conflicts.push(path.to_string());
            continue;
        };

        if let Some(blob) = chosen {
            snapshot.insert(path, *blob)?;
        }
    }

    if !conflicts.is_empty() {
        return Err(MergeError::Conflict { paths: conflicts });
    }
    Ok(TreeMerge { snapshot, resolved })
}
