use convlog_dag::DagError;
use convlog_store::StoreError;
use convlog_types::{ErrorKind, ObjectId};

/// Errors from merging.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Paths changed differently on both sides.
    #[error("merge conflict on {}", paths.join(", "))]
    Conflict { paths: Vec<String> },

    /// The two commits share no history.
    #[error("no common ancestor between {ours} and {theirs}")]
    Unrelated { ours: ObjectId, theirs: ObjectId },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Dag(#[from] DagError),
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conflict { .. } | Self::Unrelated { .. } => ErrorKind::MergeConflict,
            Self::Store(_) | Self::Dag(_) => ErrorKind::CorruptHistory,
        }
    }
}

/// Result alias for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;
