use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed taxonomy of errors a conversation reports to its callers.
///
/// Every rejected commit, failed fetch and refused local operation maps to
/// exactly one kind. [`ErrorKind::code`] groups kinds into the numeric codes
/// carried by the error signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedInitialCommit,
    MalformedVote,
    MalformedMemberCommit,
    MalformedProfileUpdate,
    MalformedEditCommit,
    MalformedGenericCommit,
    /// Certificate, issuer or expiry mismatch for the commit author.
    InvalidUserAtCommit,
    /// Commit signature does not verify against the author device key.
    BadSignature,
    /// An object needed to validate a commit is missing or undecodable.
    CorruptHistory,
    InvalidMode,
    CommitSignFailure,
    MergeConflict,
    FetchTooLarge,
    FetchNetworkFailure,
    UnauthorizedProfileUpdate,
}

impl ErrorKind {
    /// Numeric signal code.
    pub fn code(&self) -> u8 {
        match self {
            Self::FetchTooLarge | Self::FetchNetworkFailure => 1,
            Self::InvalidMode => 2,
            Self::MalformedInitialCommit
            | Self::MalformedVote
            | Self::MalformedMemberCommit
            | Self::MalformedProfileUpdate
            | Self::MalformedEditCommit
            | Self::MalformedGenericCommit
            | Self::InvalidUserAtCommit
            | Self::BadSignature
            | Self::CorruptHistory => 3,
            Self::UnauthorizedProfileUpdate => 4,
            Self::CommitSignFailure | Self::MergeConflict => 5,
        }
    }

    /// Fetch failures may be retried; everything else needs new history or
    /// a human decision first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FetchTooLarge | Self::FetchNetworkFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_kinds_share_a_code() {
        assert_eq!(ErrorKind::MalformedVote.code(), 3);
        assert_eq!(ErrorKind::BadSignature.code(), 3);
        assert_eq!(ErrorKind::FetchTooLarge.code(), 1);
        assert_eq!(ErrorKind::UnauthorizedProfileUpdate.code(), 4);
    }

    #[test]
    fn only_fetch_failures_retry() {
        assert!(ErrorKind::FetchNetworkFailure.is_retryable());
        assert!(!ErrorKind::MergeConflict.is_retryable());
    }
}
