//! Error types for the commit graph.

use convlog_store::StoreError;
use convlog_types::ObjectId;

/// Errors that can occur while loading or querying the commit graph.
#[derive(Debug, thiserror::Error)]
pub enum DagError {
    /// A commit referenced by a tip or a parent pointer is not in the store.
    #[error("missing commit {0}")]
    MissingCommit(ObjectId),

    /// A queried commit was not loaded into the graph.
    #[error("commit not in graph: {0}")]
    NodeNotFound(ObjectId),

    /// The underlying store failed or returned an undecodable object.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for graph results.
pub type DagResult<T> = Result<T, DagError>;
