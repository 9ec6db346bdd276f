/// Errors from parsing foundation types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("unknown conversation mode: {0}")]
    UnknownMode(i64),

    #[error("unknown member role: {0}")]
    UnknownRole(String),
}
