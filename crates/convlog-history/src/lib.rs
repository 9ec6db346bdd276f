//! Conversation history: the linearized log and message search.
//!
//! The commit graph is walked children before parents with ties broken by
//! timestamp. Each yielded commit is annotated with its *linearized
//! parent*, the next commit of the walk, which gives clients a stable
//! display order independent of the raw parent pointers.
//!
//! # Key Types
//!
//! - [`LogOptions`] -- range, limits and author filter of a log walk
//! - [`Filter`] -- search criteria (author, time bounds, pattern, type)
//! - [`CommitRecord`] -- one decoded commit as returned to callers
//! - [`History`] -- runs log and search walks over an object store

pub mod error;
pub mod filter;
pub mod log;
pub mod record;

pub use error::{HistoryError, HistoryResult};
pub use filter::Filter;
pub use log::{History, LogOptions};
pub use record::CommitRecord;
