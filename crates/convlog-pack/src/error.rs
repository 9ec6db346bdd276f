use thiserror::Error;

use convlog_dag::DagError;
use convlog_store::StoreError;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid pack magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported pack version: {0}")]
    UnsupportedVersion(u32),

    #[error("pack checksum mismatch")]
    ChecksumMismatch,

    #[error("corrupt pack entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for entry at offset {offset}")]
    CrcMismatch { offset: u64 },

    #[error("entry at offset {offset} inflates to {size} bytes, over the {limit} byte limit")]
    TooLarge { offset: u64, size: u64, limit: u64 },

    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("compression failed: {0}")]
    CompressionFailed(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Dag(#[from] DagError),
}

pub type PackResult<T> = Result<T, PackError>;
