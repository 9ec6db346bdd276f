//! Diff engine for convlog trees.
//!
//! Commit rules are phrased as "this commit may only touch these paths", so
//! the diff works on flattened [`Snapshot`](convlog_store::Snapshot)s and
//! reports one change per file path.
//!
//! # Key Types
//!
//! - [`TreeDiff`] / [`TreeChange`] -- added, deleted and modified files

pub mod error;
pub mod tree_diff;

pub use error::{DiffError, DiffResult};
pub use tree_diff::{diff_snapshots, diff_trees, TreeChange, TreeDiff};
