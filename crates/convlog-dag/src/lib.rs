//! Commit graph for convlog conversations.
//!
//! Loads the commits reachable from one or more tips out of an object store
//! and answers the graph questions the rest of the system needs: ancestry,
//! merge bases, the reverse-topological walk used by the log, and the set of
//! commits lying between two points (used to order fetched history and to
//! bound packs).

pub mod error;
pub mod graph;

pub use error::{DagError, DagResult};
pub use graph::{CommitGraph, GraphNode};
