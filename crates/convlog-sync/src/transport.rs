//! Byte channels between peer devices.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// An ordered, reliable, authenticated byte stream to one peer device.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Device id of the other end.
    fn peer(&self) -> &str;

    async fn write(&mut self, data: Bytes) -> SyncResult<()>;

    /// Next chunk from the peer, or `None` once the peer has closed.
    async fn read(&mut self) -> SyncResult<Option<Bytes>>;

    async fn close(&mut self);
}

/// Opens channels to peer devices.
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    async fn open(&self, device: &str, conversation: &str) -> SyncResult<Box<dyn Channel>>;
}

/// One end of an in-process channel.
pub struct MemoryChannel {
    peer: String,
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
}

impl MemoryChannel {
    /// Two connected ends; the first talks to `b`, the second to `a`.
    pub fn pair(a: &str, b: &str, capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
        let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                peer: b.to_string(),
                tx: Some(a_tx),
                rx: a_rx,
            },
            Self {
                peer: a.to_string(),
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn peer(&self) -> &str {
        &self.peer
    }

    async fn write(&mut self, data: Bytes) -> SyncResult<()> {
        let tx = self.tx.as_ref().ok_or(SyncError::ChannelClosed)?;
        tx.send(data).await.map_err(|_| SyncError::ChannelClosed)
    }

    async fn read(&mut self) -> SyncResult<Option<Bytes>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) {
        self.tx = None;
        self.rx.close();
    }
}

/// A channel opened toward a listening device.
pub struct Incoming {
    pub conversation: String,
    pub channel: MemoryChannel,
}

/// In-process network: devices listen, peers open channels to them.
pub struct MemoryNetwork {
    local: String,
    capacity: usize,
    listeners: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Incoming>>>>,
}

impl MemoryNetwork {
    pub fn new(capacity: usize) -> Self {
        Self {
            local: String::new(),
            capacity,
            listeners: Default::default(),
        }
    }

    /// A handle on the same network that opens channels as `device`.
    pub fn as_device(&self, device: impl Into<String>) -> Self {
        Self {
            local: device.into(),
            capacity: self.capacity,
            listeners: Arc::clone(&self.listeners),
        }
    }

    /// Register `device`; channels opened to it arrive on the receiver.
    pub fn listen(&self, device: impl Into<String>) -> mpsc::UnboundedReceiver<Incoming> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners
            .lock()
            .expect("lock poisoned")
            .insert(device.into(), tx);
        rx
    }
}

#[async_trait]
impl PeerNetwork for MemoryNetwork {
    async fn open(&self, device: &str, conversation: &str) -> SyncResult<Box<dyn Channel>> {
        let (local, remote) = MemoryChannel::pair(&self.local, device, self.capacity);
        let listeners = self.listeners.lock().expect("lock poisoned");
        let listener = listeners
            .get(device)
            .ok_or_else(|| SyncError::UnknownPeer(device.to_string()))?;
        listener
            .send(Incoming {
                conversation: conversation.to_string(),
                channel: remote,
            })
            .map_err(|_| SyncError::UnknownPeer(device.to_string()))?;
        debug!(from = %self.local, to = %device, conversation, "opened channel");
        Ok(Box::new(local))
    }
}
