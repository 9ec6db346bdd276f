//! High-level SDK for convlog conversations.
//!
//! A [`Conversation`] is the context object every operation goes through:
//! creation and cloning, membership changes and votes, profile updates,
//! messages, history queries, and synchronization with peer devices.
//! Failures that must reach the user are also delivered as
//! [`ConversationEvent::Error`] to subscribers.

pub mod account;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event;
pub mod members;
pub mod profile;
pub mod sync;

#[cfg(test)]
mod testutil;

pub use account::{Account, LocalAccount};
pub use config::{ConfigError, ConversationConfig};
pub use conversation::Conversation;
pub use error::{ConversationError, ConversationResult};
pub use event::{ConversationEvent, EventBus, EventKind, EventStream};
pub use members::VoteOutcome;
pub use sync::{FetchReport, MergeStatus};

// Re-export key types
pub use convlog_history::{CommitRecord, Filter, LogOptions};
pub use convlog_membership::{TargetKind, VoteDirection};
pub use convlog_sync::{FetchedPack, MemoryNetwork, PeerNetwork};
pub use convlog_types::{ConversationMode, ErrorKind, Member, MemberRole, ObjectId};
pub use convlog_validator::{CommitKind, CommitMessage};
