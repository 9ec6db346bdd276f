//! Request and response lines of the fetch negotiation.

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

use convlog_types::ObjectId;

use crate::error::{ProtocolError, ProtocolResult};
use crate::pktline::{encode_data, PktLine, MAX_PKT_LEN};

pub const PROTOCOL_VERSION: u32 = 1;

/// Command opening a fetch, followed by the conversation id.
pub const UPLOAD_PACK_CMD: &str = "git-upload-pack";

/// Capabilities announced after the head in the first advertised line.
pub const SERVER_CAPABILITIES: &str = "side-band side-band-64k shallow no-progress include-tag";

/// Largest side-band payload, band byte excluded.
pub const SIDEBAND_MAX_DATA: usize = 65_515;

/// Largest accepted transfer.
pub const MAX_FETCH_SIZE: usize = 256 * 1024 * 1024;

/// Side-band channel of a pack data line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Band {
    Data,
    Progress,
    Error,
}

impl Band {
    pub fn byte(self) -> u8 {
        match self {
            Self::Data => 1,
            Self::Progress => 2,
            Self::Error => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Data),
            2 => Some(Self::Progress),
            3 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Client to server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// `git-upload-pack <conversation>\0key=value\0...`
    UploadPack {
        conversation: String,
        params: BTreeMap<String, String>,
    },
    /// `want <id> [capabilities...]`
    Want { id: ObjectId, params: Vec<String> },
    /// `have <id>`
    Have(ObjectId),
    Done,
    Flush,
}

impl Request {
    pub fn upload_pack(conversation: impl Into<String>) -> Self {
        let mut params = BTreeMap::new();
        params.insert("version".to_string(), PROTOCOL_VERSION.to_string());
        Self::UploadPack {
            conversation: conversation.into(),
            params,
        }
    }

    pub fn want(id: ObjectId) -> Self {
        Self::Want {
            id,
            params: Vec::new(),
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        let line = match self {
            Self::Flush => return PktLine::Flush.encode(buf),
            Self::UploadPack {
                conversation,
                params,
            } => {
                let mut line = format!("{UPLOAD_PACK_CMD} {conversation}\0");
                for (key, value) in params {
                    line.push_str(&format!("{key}={value}\0"));
                }
                line
            }
            Self::Want { id, params } if params.is_empty() => format!("want {id}\n"),
            Self::Want { id, params } => format!("want {id} {}\n", params.join(" ")),
            Self::Have(id) => format!("have {id}\n"),
            Self::Done => "done\n".to_string(),
        };
        encode_data(buf, line.as_bytes())
    }

    pub fn decode(line: &PktLine) -> ProtocolResult<Self> {
        let Some(payload) = line.payload() else {
            return Ok(Self::Flush);
        };
        let text = text_of(payload)?;
        let text = text.strip_suffix('\n').unwrap_or(text);
        if text == "done" {
            return Ok(Self::Done);
        }
        let (cmd, rest) = text.split_once(' ').unwrap_or((text, ""));
        match cmd {
            UPLOAD_PACK_CMD => {
                let mut parts = rest.split('\0');
                let conversation = parts.next().unwrap_or_default().to_string();
                let params = parts
                    .filter(|p| !p.is_empty())
                    .map(|p| {
                        let (k, v) = p.split_once('=').unwrap_or((p, ""));
                        (k.to_string(), v.to_string())
                    })
                    .collect();
                Ok(Self::UploadPack {
                    conversation,
                    params,
                })
            }
            "want" => {
                let mut parts = rest.split(' ');
                let id = parse_id(parts.next().unwrap_or_default())?;
                let params = parts.filter(|p| !p.is_empty()).map(str::to_string).collect();
                Ok(Self::Want { id, params })
            }
            "have" => Ok(Self::Have(parse_id(rest)?)),
            _ => Err(ProtocolError::UnexpectedLine(text.to_string())),
        }
    }
}

/// Whether an `ACK` closes negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckStatus {
    /// `ACK <id>`
    Final,
    /// `ACK <id> continue`
    Continue,
}

/// Server to client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// `version <n>`
    Version(u32),
    /// `<id> <name>[\0capabilities]`: one line of the ref advertisement.
    Ref {
        id: ObjectId,
        name: String,
        capabilities: Option<String>,
    },
    Nak,
    Ack { id: ObjectId, status: AckStatus },
    SideBand { band: Band, data: Bytes },
    Flush,
}

impl Response {
    pub fn encode(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        let line = match self {
            Self::Flush => return PktLine::Flush.encode(buf),
            Self::SideBand { band, data } => {
                if data.len() > SIDEBAND_MAX_DATA {
                    return Err(ProtocolError::PayloadTooLarge {
                        size: data.len(),
                        max: SIDEBAND_MAX_DATA,
                    });
                }
                let mut payload = BytesMut::with_capacity(data.len() + 1);
                payload.put_u8(band.byte());
                payload.put_slice(data);
                return encode_data(buf, &payload);
            }
            Self::Version(v) => format!("version {v}\n"),
            Self::Ref {
                id,
                name,
                capabilities: Some(caps),
            } => format!("{id} {name}\0{caps}\n"),
            Self::Ref { id, name, .. } => format!("{id} {name}\n"),
            Self::Nak => "NAK\n".to_string(),
            Self::Ack {
                id,
                status: AckStatus::Final,
            } => format!("ACK {id}\n"),
            Self::Ack {
                id,
                status: AckStatus::Continue,
            } => format!("ACK {id} continue\n"),
        };
        encode_data(buf, line.as_bytes())
    }

    pub fn decode(line: &PktLine) -> ProtocolResult<Self> {
        let Some(payload) = line.payload() else {
            return Ok(Self::Flush);
        };
        if let Some(band) = payload.first().copied().and_then(Band::from_byte) {
            return Ok(Self::SideBand {
                band,
                data: Bytes::copy_from_slice(&payload[1..]),
            });
        }
        let text = text_of(payload)?;
        let text = text.strip_suffix('\n').unwrap_or(text);
        if text == "NAK" {
            return Ok(Self::Nak);
        }
        if let Some(rest) = text.strip_prefix("ACK ") {
            let (id, status) = match rest.strip_suffix(" continue") {
                Some(id) => (id, AckStatus::Continue),
                None => (rest, AckStatus::Final),
            };
            return Ok(Self::Ack {
                id: parse_id(id)?,
                status,
            });
        }
        if let Some(v) = text.strip_prefix("version ") {
            let v = v
                .trim_end_matches('\0')
                .parse()
                .map_err(|_| ProtocolError::UnsupportedVersion(v.to_string()))?;
            return Ok(Self::Version(v));
        }
        let (id, rest) = text
            .split_once(' ')
            .ok_or_else(|| ProtocolError::UnexpectedLine(text.to_string()))?;
        let (name, capabilities) = match rest.split_once('\0') {
            Some((name, caps)) => (name, Some(caps.to_string())),
            None => (rest, None),
        };
        Ok(Self::Ref {
            id: parse_id(id)?,
            name: name.to_string(),
            capabilities,
        })
    }

    /// Split `data` into side-band data lines of at most `chunk` bytes.
    pub fn sideband_chunks(data: &Bytes, chunk: usize) -> impl Iterator<Item = Response> + '_ {
        let chunk = chunk.clamp(1, SIDEBAND_MAX_DATA.min(MAX_PKT_LEN - 5));
        (0..data.len()).step_by(chunk).map(move |start| Response::SideBand {
            band: Band::Data,
            data: data.slice(start..(start + chunk).min(data.len())),
        })
    }
}

fn text_of(payload: &[u8]) -> ProtocolResult<&str> {
    std::str::from_utf8(payload)
        .map_err(|_| ProtocolError::UnexpectedLine(String::from_utf8_lossy(payload).into_owned()))
}

fn parse_id(text: &str) -> ProtocolResult<ObjectId> {
    ObjectId::from_hex(text.trim()).map_err(|_| ProtocolError::InvalidId(text.to_string()))
}
