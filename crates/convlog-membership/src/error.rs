use convlog_store::StoreError;

/// Errors from reading membership state.
#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unknown vote target kind: {0:?}")]
    UnknownTargetKind(String),

    #[error("unknown vote direction: {0:?}")]
    UnknownDirection(String),

    /// A resolution tried to move a file that is not where it should be.
    #[error("missing file for resolution: {0}")]
    MissingFile(String),
}

/// Result alias for membership operations.
pub type MembershipResult<T> = Result<T, MembershipError>;
