use convlog_dag::DagError;
use convlog_membership::MembershipError;
use convlog_store::StoreError;
use convlog_types::ObjectId;

/// Errors from walking history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Dag(#[from] DagError),

    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("commit {id} has an undecodable message: {reason}")]
    CorruptMessage { id: ObjectId, reason: String },
}

/// Result alias for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
