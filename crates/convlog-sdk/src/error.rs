use thiserror::Error;

use convlog_dag::DagError;
use convlog_history::HistoryError;
use convlog_membership::MembershipError;
use convlog_merge::MergeError;
use convlog_pack::PackError;
use convlog_refs::RefError;
use convlog_store::StoreError;
use convlog_sync::SyncError;
use convlog_types::{ErrorKind, ObjectId};
use convlog_validator::{Rejection, ValidatorError};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error("conversation has no head")]
    NoHead,

    #[error("only the head can be amended, {0} is not the head")]
    NotHead(ObjectId),

    #[error("fetched history belongs to conversation {got}, expected {expected}")]
    WrongConversation { expected: ObjectId, got: ObjectId },

    #[error("{0} is already invited")]
    AlreadyInvited(String),

    #[error("{0} is already a member")]
    AlreadyMember(String),

    #[error("{0} is banned")]
    Banned(String),

    #[error("{0} is not invited")]
    NotInvited(String),

    #[error("{0} is not a member")]
    NotMember(String),

    #[error("{0} is not an admin")]
    NotAdmin(String),

    #[error("nothing to vote on for {0}")]
    NothingToVote(String),

    #[error("vote on {target} incomplete: {votes}/{admins}")]
    IncompleteVote {
        target: String,
        votes: usize,
        admins: usize,
    },

    #[error("{0} may not update the profile")]
    Unauthorized(String),

    #[error("head moved while committing")]
    Concurrent,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),

    #[error("graph error: {0}")]
    Dag(#[from] DagError),

    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("root error: {0}")]
    Root(#[from] ValidatorError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),
}

impl ConversationError {
    /// Kind carried by the error signal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected(r) => r.kind(),
            Self::InvalidMode(_) => ErrorKind::InvalidMode,
            Self::WrongConversation { .. } => ErrorKind::MalformedInitialCommit,
            Self::AlreadyInvited(_)
            | Self::AlreadyMember(_)
            | Self::Banned(_)
            | Self::NotInvited(_)
            | Self::NotMember(_) => ErrorKind::MalformedMemberCommit,
            Self::NotAdmin(_) | Self::NothingToVote(_) | Self::IncompleteVote { .. } => {
                ErrorKind::MalformedVote
            }
            Self::Unauthorized(_) => ErrorKind::UnauthorizedProfileUpdate,
            Self::Root(e) => e.kind(),
            Self::Merge(e) => e.kind(),
            Self::Sync(e) => e.kind(),
            Self::Pack(PackError::TooLarge { .. }) => ErrorKind::FetchTooLarge,
            Self::Pack(_) => ErrorKind::FetchNetworkFailure,
            Self::History(_) | Self::Dag(_) | Self::Membership(_) => ErrorKind::CorruptHistory,
            Self::NoHead | Self::NotHead(_) | Self::Concurrent | Self::Store(_) | Self::Ref(_) => {
                ErrorKind::CommitSignFailure
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Concurrent) || self.kind().is_retryable()
    }
}

pub type ConversationResult<T> = Result<T, ConversationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use convlog_protocol::ProtocolError;

    #[test]
    fn rejections_keep_their_kind() {
        let id = ObjectId::from_bytes(b"c");
        let err: ConversationError = Rejection::new(id, ErrorKind::BadSignature, "x").into();
        assert_eq!(err.kind(), ErrorKind::BadSignature);
        assert!(!err.is_retryable());
    }

    #[test]
    fn fetch_failures_retry() {
        let err: ConversationError = SyncError::ChannelClosed.into();
        assert_eq!(err.kind(), ErrorKind::FetchNetworkFailure);
        assert!(err.is_retryable());

        let too_large = ProtocolError::FetchTooLarge { size: 10, max: 5 };
        let err: ConversationError = SyncError::from(too_large).into();
        assert_eq!(err.kind(), ErrorKind::FetchTooLarge);

        let inflated = PackError::TooLarge {
            offset: 12,
            size: 10,
            limit: 5,
        };
        let err: ConversationError = inflated.into();
        assert_eq!(err.kind(), ErrorKind::FetchTooLarge);
        assert!(err.is_retryable());
    }

    #[test]
    fn local_refusals() {
        assert_eq!(
            ConversationError::Unauthorized("bob".into()).kind(),
            ErrorKind::UnauthorizedProfileUpdate
        );
        assert_eq!(
            ConversationError::AlreadyInvited("bob".into()).kind(),
            ErrorKind::MalformedMemberCommit
        );
        assert!(ConversationError::Concurrent.is_retryable());
    }
}
