//! Deciding how a fetched commit joins the local history.

use tracing::{debug, info};

use convlog_dag::CommitGraph;
use convlog_store::{ObjectStore, ObjectStoreExt, Snapshot};
use convlog_types::ObjectId;

use crate::error::{MergeError, MergeResult};
use crate::three_way::{merge_snapshots, Side};

/// What merging a commit into the head requires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The commit is already part of the head's history.
    UpToDate,
    /// The head is an ancestor of the commit; move the head to it.
    FastForward(ObjectId),
    /// Both sides diverged. `tree` has been written to the store and is
    /// the tree of the merge commit with parents `[head, theirs]`.
    Merged {
        base: ObjectId,
        theirs: ObjectId,
        tree: ObjectId,
        resolved: Vec<(String, Side)>,
    },
}

/// Computes merge outcomes against one object store.
pub struct MergeEngine<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// Plan merging `theirs` into `head`, writing the merged tree if one is
    /// needed. A missing head fast-forwards.
    pub fn merge(&self, head: Option<&ObjectId>, theirs: &ObjectId) -> MergeResult<MergeOutcome> {
        let Some(head) = head else {
            return Ok(MergeOutcome::FastForward(*theirs));
        };
        if head == theirs {
            return Ok(MergeOutcome::UpToDate);
        }

        let graph = CommitGraph::load(self.store, &[*head, *theirs])?;
        if graph.is_ancestor(theirs, head) {
            debug!(head = %head.short_hex(), theirs = %theirs.short_hex(), "already merged");
            return Ok(MergeOutcome::UpToDate);
        }
        if graph.is_ancestor(head, theirs) {
            debug!(head = %head.short_hex(), theirs = %theirs.short_hex(), "fast-forward");
            return Ok(MergeOutcome::FastForward(*theirs));
        }

        let base = graph
            .merge_base(head, theirs)?
            .ok_or(MergeError::Unrelated {
                ours: *head,
                theirs: *theirs,
            })?;
        let merged = merge_snapshots(
            &self.snapshot(&base)?,
            &self.snapshot(head)?,
            &self.snapshot(theirs)?,
            head,
            theirs,
        )?;
        let tree = merged.snapshot.write(self.store)?;
        info!(
            head = %head.short_hex(),
            theirs = %theirs.short_hex(),
            base = %base.short_hex(),
            resolved = merged.resolved.len(),
            "three-way merge"
        );
        Ok(MergeOutcome::Merged {
            base,
            theirs: *theirs,
            tree,
            resolved: merged.resolved,
        })
    }

    fn snapshot(&self, commit: &ObjectId) -> MergeResult<Snapshot> {
        let commit = self.store.read_commit(commit)?;
        Ok(Snapshot::load(self.store, &commit.tree)?)
    }
}
