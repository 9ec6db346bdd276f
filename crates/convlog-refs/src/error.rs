//! Error types for reference operations.

use thiserror::Error;
use convlog_types::ObjectId;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The branch or remote name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Compare-and-swap lost a race: the ref moved since it was read.
    #[error("ref {name} moved: expected {expected:?}, found {actual:?}")]
    Stale {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    /// The backing storage is unusable (poisoned lock, unreadable file).
    #[error("ref storage error: {0}")]
    Storage(String),
}

/// Convenience type alias for ref operations.
pub type RefResult<T> = std::result::Result<T, RefError>;
