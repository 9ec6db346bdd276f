//! Content-addressed object storage for convlog.
//!
//! Every conversation is a hash-keyed object store analogous to git's
//! `.git/objects/` directory. Blobs, trees and commits are immutable objects
//! identified by their BLAKE3 hash (domain-separated by object kind).
//!
//! # Object Types
//!
//! - [`Blob`] -- raw file content (certificates, markers, the profile)
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`CommitObject`] -- signed pointer to a tree plus zero to two parents
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- loose objects on disk, written atomically
//!
//! [`StagedObjectStore`] layers unvalidated writes over another store so a
//! rejected fetch leaves no trace.
//!
//! [`Snapshot`] flattens a tree into `path -> blob id` so membership rules can
//! address files like `admins/<uri>.crt` directly.

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod snapshot;
pub mod staged;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{Author, Blob, CommitObject, EntryMode, ObjectKind, StoredObject, Tree, TreeEntry};
pub use snapshot::{Snapshot, MAX_TREE_DEPTH};
pub use staged::StagedObjectStore;
pub use traits::{ObjectStore, ObjectStoreExt};
