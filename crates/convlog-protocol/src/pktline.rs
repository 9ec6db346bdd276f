//! pkt-line framing.
//!
//! Each line is a 4-digit lowercase hex length, counting the 4 length
//! bytes themselves, followed by the payload. `0000` is a flush line and
//! carries no payload. Lengths 1 to 3 are invalid.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Largest encodable line, length prefix included.
pub const MAX_PKT_LEN: usize = 0xFFFF;

const PREFIX_LEN: usize = 4;

/// One decoded line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PktLine {
    Flush,
    Data(Bytes),
}

impl PktLine {
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self::Data(payload.into())
    }

    /// Append the framed line to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> ProtocolResult<()> {
        match self {
            Self::Flush => {
                buf.put_slice(b"0000");
                Ok(())
            }
            Self::Data(payload) => encode_data(buf, payload),
        }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Self::Flush => None,
            Self::Data(payload) => Some(payload),
        }
    }
}

/// Append `payload` as one data line.
pub fn encode_data(buf: &mut BytesMut, payload: &[u8]) -> ProtocolResult<()> {
    let total = payload.len() + PREFIX_LEN;
    if total > MAX_PKT_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PKT_LEN - PREFIX_LEN,
        });
    }
    buf.reserve(total);
    buf.put_slice(format!("{total:04x}").as_bytes());
    buf.put_slice(payload);
    Ok(())
}

/// Incremental decoder: bytes arrive in arbitrary chunks and complete
/// lines are taken off the front as they become available.
#[derive(Debug, Default)]
pub struct PktLineDecoder {
    buf: BytesMut,
}

impl PktLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes received but not yet decoded.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Next complete line, or `None` if more input is needed.
    pub fn next_line(&mut self) -> ProtocolResult<Option<PktLine>> {
        if self.buf.len() < PREFIX_LEN {
            return Ok(None);
        }
        let len = parse_length(&self.buf[..PREFIX_LEN])?;
        if len == 0 {
            self.buf.advance(PREFIX_LEN);
            return Ok(Some(PktLine::Flush));
        }
        if len < PREFIX_LEN {
            return Err(ProtocolError::FramingError(format!("invalid length {len}")));
        }
        if self.buf.len() < len {
            return Ok(None);
        }
        let mut line = self.buf.split_to(len);
        line.advance(PREFIX_LEN);
        Ok(Some(PktLine::Data(line.freeze())))
    }

    /// Every complete line currently buffered.
    pub fn drain(&mut self) -> ProtocolResult<Vec<PktLine>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line()? {
            lines.push(line);
        }
        Ok(lines)
    }
}

fn parse_length(prefix: &[u8]) -> ProtocolResult<usize> {
    let text = std::str::from_utf8(prefix)
        .map_err(|_| ProtocolError::FramingError("non-ascii length".into()))?;
    usize::from_str_radix(text, 16)
        .map_err(|_| ProtocolError::FramingError(format!("bad length {text:?}")))
}
