//! Wire protocol for convlog.
//!
//! Fetching follows the fetch half of the git pack protocol, version 1:
//! pkt-line framing (`<4 hex digits><payload>`, `0000` is a flush), a
//! reference advertisement, `want`/`have`/`done` negotiation, and a pack
//! streamed on side-band 1 in chunks of at most 65,515 bytes.
//!
//! Everything here is synchronous and free of I/O. The async channel and
//! the fetch/serve loops live in `convlog-sync`.

pub mod client;
pub mod error;
pub mod message;
pub mod pktline;
pub mod server;

pub use client::{Advertisement, PackReceiver};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    AckStatus, Band, Request, Response, MAX_FETCH_SIZE, PROTOCOL_VERSION, SERVER_CAPABILITIES,
    SIDEBAND_MAX_DATA, UPLOAD_PACK_CMD,
};
pub use pktline::{PktLine, PktLineDecoder, MAX_PKT_LEN};
pub use server::{ServerOutput, UploadPackServer};
