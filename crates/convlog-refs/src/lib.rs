//! Reference management for convlog.
//!
//! A conversation has one mutable pointer, `refs/heads/main`, naming its
//! latest accepted commit. Remote refs (`refs/remotes/<device>/main`) record
//! the last validated tip fetched from each peer device.
//!
//! # Modules
//!
//! - [`error`] -- Error types for ref operations
//! - [`types`] -- [`Ref`] and canonical ref names
//! - [`traits`] -- The [`RefStore`] trait, including compare-and-swap advance
//! - [`names`] -- Branch/remote name validation
//! - [`memory`] -- In-memory [`InMemoryRefStore`]

pub mod error;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, RefResult};
pub use memory::InMemoryRefStore;
pub use names::{validate_branch_name, validate_remote_name};
pub use traits::RefStore;
pub use types::{branch_ref_name, remote_ref_name, Ref, MAIN_BRANCH};
