//! Merge engine for convlog.
//!
//! Merging a wanted commit into the local head either does nothing (the
//! commit is already known), moves the head forward, or produces a merged
//! tree from a three-way comparison against the merge base. The only
//! conflict resolved automatically is `profile.vcf`: the version from the
//! side with the greater commit id wins, so every peer converges on the
//! same tree. Any other conflicting path aborts the merge.
//!
//! The engine never writes commits or refs; it returns the tree the caller
//! signs and commits.

pub mod engine;
pub mod error;
pub mod three_way;

pub use engine::{MergeEngine, MergeOutcome};
pub use error::{MergeError, MergeResult};
pub use three_way::{merge_snapshots, Side, TreeMerge};
