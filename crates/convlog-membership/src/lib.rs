//! Membership state of a conversation, derived from a tree snapshot.
//!
//! A conversation has no membership database: the tree at each commit *is*
//! the access-control table. This crate knows the well-known layout of that
//! tree and reads it back.
//!
//! # Key Types
//!
//! - [`paths`] -- the fixed file layout (`admins/<uri>.crt`, `devices/<id>.crt`, ...)
//! - [`TargetKind`] / [`VoteDirection`] / [`Tally`] -- moderation ballots and quorum
//! - [`DeviceOwnerCache`] -- shared device id to member uri cache
//!
//! # Functions
//!
//! - [`members_at`] -- the member table at a snapshot
//! - [`role_of`] -- the role of one uri
//! - [`devices`] / [`devices_of`] -- device certificates in a snapshot

pub mod devices;
pub mod error;
pub mod paths;
pub mod table;
pub mod vote;

pub use devices::{device_certificate, devices, devices_of, DeviceOwnerCache};
pub use error::{MembershipError, MembershipResult};
pub use table::{admins, has_account_certificate, member_certificate, members_at, role_of};
pub use vote::{apply_resolution, parse_vote_path, tally, Tally, TargetKind, VoteDirection, VotePath};
