//! Foundation types for convlog, a permissioned replicated conversation log.
//!
//! Every other convlog crate depends on `convlog-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`ConversationMode`] -- Immutable join policy fixed by the initial commit
//! - [`MemberRole`] / [`Member`] -- A participant and its role at some commit
//! - [`ErrorKind`] -- Closed taxonomy of conversation errors reported to callers

pub mod error;
pub mod kind;
pub mod member;
pub mod mode;
pub mod object;

pub use error::TypeError;
pub use kind::ErrorKind;
pub use member::{Member, MemberRole};
pub use mode::ConversationMode;
pub use object::ObjectId;
