use thiserror::Error;

use convlog_pack::PackError;
use convlog_refs::RefError;
use convlog_store::StoreError;
use convlog_types::{ErrorKind, ObjectId};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("framing error: {0}")]
    FramingError(String),

    #[error("pkt-line payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("unexpected line: {0}")]
    UnexpectedLine(String),

    #[error("invalid object id: {0}")]
    InvalidId(String),

    #[error("request for conversation {got}, serving {expected}")]
    UnknownConversation { expected: String, got: String },

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),

    #[error("wanted commit {0} is not known")]
    UnknownWant(ObjectId),

    #[error("negotiation finished without a want")]
    MissingWant,

    #[error("conversation has no head")]
    NoHead,

    #[error("fetch exceeds size limit: {size} bytes (max {max})")]
    FetchTooLarge { size: usize, max: usize },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Ref(#[from] RefError),
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FetchTooLarge { .. } => ErrorKind::FetchTooLarge,
            _ => ErrorKind::FetchNetworkFailure,
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
