//! Serve loop: one upload-pack server per incoming channel.

use tracing::{debug, warn};

use convlog_protocol::{UploadPackServer, MAX_FETCH_SIZE, SIDEBAND_MAX_DATA};
use convlog_refs::RefStore;
use convlog_store::ObjectStore;
use convlog_types::ObjectId;

use crate::error::SyncResult;
use crate::transport::Channel;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServeOptions {
    pub sideband_chunk: usize,
    pub max_pack_size: usize,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            sideband_chunk: SIDEBAND_MAX_DATA,
            max_pack_size: MAX_FETCH_SIZE,
        }
    }
}

/// Answer fetch requests on `channel` until the peer closes it.
///
/// Returns the commits a pack was sent for. A protocol error closes the
/// channel.
pub async fn serve(
    channel: &mut dyn Channel,
    conversation: &str,
    store: &dyn ObjectStore,
    refs: &dyn RefStore,
    options: &ServeOptions,
) -> SyncResult<Vec<ObjectId>> {
    let mut server = UploadPackServer::new(conversation, store, refs)
        .with_limits(options.sideband_chunk, options.max_pack_size);
    let mut served = Vec::new();

    while let Some(data) = channel.read().await? {
        let output = match server.receive(&data) {
            Ok(output) => output,
            Err(e) => {
                warn!(conversation, peer = %channel.peer(), error = %e, "closing fetch channel");
                channel.close().await;
                return Err(e.into());
            }
        };
        if !output.reply.is_empty() {
            channel.write(output.reply).await?;
        }
        if let Some(id) = output.served {
            served.push(id);
        }
    }

    debug!(conversation, peer = %channel.peer(), packs = served.len(), "peer closed fetch channel");
    channel.close().await;
    Ok(served)
}
