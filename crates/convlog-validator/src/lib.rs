//! Commit validation for convlog.
//!
//! Every commit received from a peer is replayed through a rule engine
//! before it may become part of local history. The rules depend on the
//! commit's kind (decoded from its JSON message), on the membership state at
//! its parent, and on the certificate chain of its author device.
//!
//! Validation is synchronous and side-effect free: it reads the object store
//! and never writes to it.
//!
//! # Key Types
//!
//! - [`CommitMessage`] -- the JSON metadata map carried by every commit
//! - [`CommitKind`] -- closed set of commit kinds, with a content variant for
//!   free-form message types
//! - [`CommitValidator`] -- validates single commits or oldest-first batches
//! - [`Rejection`] -- why a commit was refused, as an [`ErrorKind`](convlog_types::ErrorKind)
//! - [`RootInfo`] -- mode and initial participants read from the root commit

pub mod config;
pub mod error;
pub mod message;
pub mod root;
mod rules;
#[cfg(test)]
mod testutil;
pub mod validator;

pub use config::ValidatorConfig;
pub use error::{MessageError, Rejection, ValidatorError};
pub use message::{CommitKind, CommitMessage, MemberAction};
pub use root::RootInfo;
pub use validator::{validate_batch, CommitValidator};
