//! Client-side state of a fetch: the parsed advertisement and the pack
//! accumulated from side-band lines.

use bytes::BytesMut;
use tracing::debug;

use convlog_types::ObjectId;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{AckStatus, Band, Response};

/// What a server announced before negotiation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Advertisement {
    pub version: Option<u32>,
    pub head: Option<ObjectId>,
    pub capabilities: Vec<String>,
    /// Every advertised `(name, id)` after the head line.
    pub refs: Vec<(String, ObjectId)>,
}

impl Advertisement {
    /// Fold one response line in. Returns `true` on the closing flush.
    pub fn accept(&mut self, response: Response) -> ProtocolResult<bool> {
        match response {
            Response::Flush => return Ok(true),
            Response::Version(v) => self.version = Some(v),
            Response::Ref {
                id,
                name,
                capabilities,
            } => {
                if let Some(caps) = capabilities {
                    self.capabilities = caps.split(' ').map(str::to_string).collect();
                }
                if name == "HEAD" {
                    self.head = Some(id);
                } else {
                    self.refs.push((name, id));
                }
            }
            other => {
                return Err(ProtocolError::UnexpectedLine(format!(
                    "{other:?} in advertisement"
                )))
            }
        }
        Ok(false)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c == name)
    }
}

/// Collects the pack of a fetch response, enforcing a byte ceiling.
#[derive(Debug)]
pub struct PackReceiver {
    max_size: usize,
    pack: BytesMut,
    common: Option<ObjectId>,
    answered: bool,
}

impl PackReceiver {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            pack: BytesMut::new(),
            common: None,
            answered: false,
        }
    }

    /// Fold one response line in. Returns `true` once the pack is complete.
    pub fn accept(&mut self, response: Response) -> ProtocolResult<bool> {
        match response {
            Response::Nak => self.answered = true,
            Response::Ack {
                id,
                status: AckStatus::Final,
            } => {
                self.common = Some(id);
                self.answered = true;
            }
            Response::Ack {
                status: AckStatus::Continue,
                ..
            } => {}
            Response::SideBand {
                band: Band::Data,
                data,
            } => {
                let size = self.pack.len() + data.len();
                if size > self.max_size {
                    return Err(ProtocolError::FetchTooLarge {
                        size,
                        max: self.max_size,
                    });
                }
                self.pack.extend_from_slice(&data);
            }
            Response::SideBand {
                band: Band::Progress,
                data,
            } => debug!(progress = %String::from_utf8_lossy(&data), "remote progress"),
            Response::SideBand {
                band: Band::Error,
                data,
            } => return Err(ProtocolError::Remote(String::from_utf8_lossy(&data).into_owned())),
            Response::Flush if self.answered => return Ok(true),
            other => {
                return Err(ProtocolError::UnexpectedLine(format!(
                    "{other:?} before pack"
                )))
            }
        }
        Ok(false)
    }

    /// Common base acknowledged by the server, if any.
    pub fn common(&self) -> Option<ObjectId> {
        self.common
    }

    pub fn received(&self) -> usize {
        self.pack.len()
    }

    pub fn into_pack(self) -> Vec<u8> {
        self.pack.to_vec()
    }
}
