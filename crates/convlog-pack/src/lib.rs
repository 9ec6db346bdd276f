//! Pack format for convlog.
//!
//! A pack is the body of a fetch response: every object the receiver is
//! missing, concatenated into one self-describing stream.
//!
//! # Layout
//!
//! - Header: magic `CLPK`, format version and object count (big-endian u32)
//! - Entries: type byte, varint raw size, varint compressed size, CRC32 of
//!   the compressed bytes, zstd-compressed object data
//! - Trailer: BLAKE3 checksum of everything before it
//!
//! Object ids are not stored; the reader recomputes them from kind and
//! content, so a pack cannot smuggle an object under a false id.

pub mod collect;
pub mod error;
pub mod reader;
mod varint;
pub mod writer;

pub use collect::missing_objects;
pub use error::{PackError, PackResult};
pub use reader::{PackReader, UnpackedObject};
pub use writer::PackWriter;

pub(crate) const MAGIC: &[u8; 4] = b"CLPK";
pub(crate) const VERSION: u32 = 1;
pub(crate) const HEADER_LEN: usize = 12;
pub(crate) const TRAILER_LEN: usize = 32;
/// Type byte, two one-byte varints and the CRC32.
pub(crate) const MIN_ENTRY_LEN: usize = 7;

/// Default cap on the decompressed size of one pack.
pub const MAX_UNPACKED_SIZE: u64 = 256 * 1024 * 1024;
