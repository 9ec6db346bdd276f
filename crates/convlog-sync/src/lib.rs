//! Synchronization between peer devices.
//!
//! A fetch runs over a [`Channel`]: an ordered, reliable byte stream to one
//! peer device. [`fetch`] drives the client side of the negotiation and
//! returns the raw pack; [`serve`] answers one channel with an
//! upload-pack server. Neither validates history: the caller unpacks into
//! a [`StagedObjectStore`](convlog_store::StagedObjectStore), validates,
//! and only then applies.

pub mod error;
pub mod fetch;
pub mod serve;
pub mod transport;

pub use error::{SyncError, SyncResult};
pub use fetch::{fetch, FetchOptions, FetchedPack};
pub use serve::{serve, ServeOptions};
pub use transport::{Channel, Incoming, MemoryChannel, MemoryNetwork, PeerNetwork};
