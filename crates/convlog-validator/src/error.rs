use convlog_membership::MembershipError;
use convlog_store::StoreError;
use convlog_types::{ErrorKind, ObjectId};

/// A commit refused by the rule engine.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("commit {commit} rejected ({kind}): {reason}")]
pub struct Rejection {
    pub commit: ObjectId,
    pub kind: ErrorKind,
    pub reason: String,
}

impl Rejection {
    pub fn new(commit: ObjectId, kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            commit,
            kind,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// An object needed to judge `commit` could not be read.
    pub fn corrupt(commit: ObjectId, err: impl std::fmt::Display) -> Self {
        Self::new(commit, ErrorKind::CorruptHistory, err.to_string())
    }
}

/// Errors decoding a commit message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("commit message is not a JSON object")]
    NotAnObject,

    #[error("missing or non-string key {0:?}")]
    MissingKey(&'static str),

    #[error("invalid conversation mode: {0}")]
    InvalidMode(String),
}

/// Errors reading the root of a conversation.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    #[error("commit {0} is not a root commit")]
    NotRoot(ObjectId),

    #[error("author device of root commit {0} has no certificate")]
    UnknownAuthor(ObjectId),
}

impl ValidatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Message(MessageError::InvalidMode(_)) => ErrorKind::InvalidMode,
            Self::Message(_) | Self::NotRoot(_) | Self::UnknownAuthor(_) => {
                ErrorKind::MalformedInitialCommit
            }
            Self::Store(_) | Self::Membership(_) => ErrorKind::CorruptHistory,
        }
    }
}
