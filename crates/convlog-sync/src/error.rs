use thiserror::Error;

use convlog_pack::PackError;
use convlog_protocol::ProtocolError;
use convlog_store::StoreError;
use convlog_types::ErrorKind;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("channel closed by peer")]
    ChannelClosed,

    #[error("no route to device {0}")]
    UnknownPeer(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Signal kind; every sync failure is a fetch failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Protocol(e) => e.kind(),
            _ => ErrorKind::FetchNetworkFailure,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
