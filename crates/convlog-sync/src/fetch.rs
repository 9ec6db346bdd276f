//! Client side of a fetch.

use bytes::BytesMut;
use tracing::{debug, info, warn};

use convlog_protocol::{
    Advertisement, PackReceiver, PktLineDecoder, Request, Response, MAX_FETCH_SIZE,
};
use convlog_types::ObjectId;

use crate::error::{SyncError, SyncResult};
use crate::transport::Channel;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOptions {
    /// Abort once the pack grows past this many bytes.
    pub max_size: usize,
    /// Commit to request; the advertised head when `None`.
    pub want: Option<ObjectId>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_size: MAX_FETCH_SIZE,
            want: None,
        }
    }
}

/// Result of a completed fetch. Nothing has been written anywhere yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedPack {
    /// Head advertised by the peer.
    pub head: ObjectId,
    /// Commit the pack was requested for.
    pub want: ObjectId,
    /// Common base acknowledged by the peer.
    pub common: Option<ObjectId>,
    pub refs: Vec<(String, ObjectId)>,
    pub pack: Vec<u8>,
}

/// Fetch from the peer at the other end of `channel`, announcing `haves`.
///
/// The channel is closed afterwards, on success or failure.
pub async fn fetch(
    channel: &mut dyn Channel,
    conversation: &str,
    haves: &[ObjectId],
    options: &FetchOptions,
) -> SyncResult<FetchedPack> {
    let result = negotiate(channel, conversation, haves, options).await;
    channel.close().await;
    match &result {
        Ok(fetched) => info!(
            conversation,
            peer = %channel.peer(),
            want = %fetched.want.short_hex(),
            bytes = fetched.pack.len(),
            "fetched pack"
        ),
        Err(e) => warn!(conversation, peer = %channel.peer(), error = %e, "fetch failed"),
    }
    result
}

async fn negotiate(
    channel: &mut dyn Channel,
    conversation: &str,
    haves: &[ObjectId],
    options: &FetchOptions,
) -> SyncResult<FetchedPack> {
    let mut reader = LineReader::default();

    let mut request = BytesMut::new();
    Request::upload_pack(conversation).encode(&mut request)?;
    channel.write(request.freeze()).await?;

    let mut advertisement = Advertisement::default();
    while !advertisement.accept(reader.next(channel).await?)? {}
    let head = advertisement.head.ok_or(convlog_protocol::ProtocolError::NoHead)?;
    let want = options.want.unwrap_or(head);
    debug!(conversation, head = %head.short_hex(), refs = advertisement.refs.len(), "advertisement");

    let mut request = BytesMut::new();
    Request::want(want).encode(&mut request)?;
    for have in haves {
        Request::Have(*have).encode(&mut request)?;
    }
    Request::Done.encode(&mut request)?;
    channel.write(request.freeze()).await?;

    let mut receiver = PackReceiver::new(options.max_size);
    while !receiver.accept(reader.next(channel).await?)? {}

    Ok(FetchedPack {
        head,
        want,
        common: receiver.common(),
        refs: advertisement.refs,
        pack: receiver.into_pack(),
    })
}

/// Reads whole response lines off a channel.
#[derive(Default)]
struct LineReader {
    decoder: PktLineDecoder,
}

impl LineReader {
    async fn next(&mut self, channel: &mut dyn Channel) -> SyncResult<Response> {
        loop {
            if let Some(line) = self.decoder.next_line()? {
                return Ok(Response::decode(&line)?);
            }
            match channel.read().await? {
                Some(data) => self.decoder.feed(&data),
                None => return Err(SyncError::ChannelClosed),
            }
        }
    }
}
