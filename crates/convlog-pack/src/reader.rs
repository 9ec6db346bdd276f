use std::io::Read;

use convlog_store::{ObjectKind, ObjectStore, StoredObject};
use convlog_types::ObjectId;

use crate::error::{PackError, PackResult};
use crate::varint::decode_varint;
use crate::{HEADER_LEN, MAGIC, MAX_UNPACKED_SIZE, MIN_ENTRY_LEN, TRAILER_LEN, VERSION};

/// One object decoded from a pack, with its recomputed id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnpackedObject {
    pub id: ObjectId,
    pub object: StoredObject,
}

/// Validates and decodes a complete pack.
#[derive(Debug)]
pub struct PackReader<'a> {
    data: &'a [u8],
    count: u32,
    max_unpacked: u64,
}

impl<'a> PackReader<'a> {
    /// Check the header and trailer checksum of `data`.
    pub fn new(data: &'a [u8]) -> PackResult<Self> {
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(PackError::CorruptEntry {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &data[0..4] != MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&data[0..4]).into(),
            });
        }
        let version = read_u32(&data[4..8]);
        if version != VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let count = read_u32(&data[8..12]);

        let (body, trailer) = data.split_at(data.len() - TRAILER_LEN);
        if blake3::hash(body).as_bytes() != trailer {
            return Err(PackError::ChecksumMismatch);
        }
        let room = (body.len() - HEADER_LEN) / MIN_ENTRY_LEN;
        if count as usize > room {
            return Err(PackError::CorruptEntry {
                offset: 8,
                reason: format!("{count} objects announced, room for {room}"),
            });
        }
        Ok(Self {
            data: body,
            count,
            max_unpacked: MAX_UNPACKED_SIZE,
        })
    }

    /// Cap on the total decompressed size of all entries.
    pub fn with_limit(mut self, max_unpacked: u64) -> Self {
        self.max_unpacked = max_unpacked;
        self
    }

    /// Number of objects announced in the header.
    pub fn object_count(&self) -> usize {
        self.count as usize
    }

    /// Decode every entry, in pack order.
    pub fn objects(&self) -> PackResult<Vec<UnpackedObject>> {
        let mut pos = HEADER_LEN;
        let mut budget = self.max_unpacked;
        let mut out = Vec::with_capacity(self.object_count());
        for _ in 0..self.count {
            let (object, next) = self.read_at(pos, budget)?;
            budget -= object.data.len() as u64;
            out.push(UnpackedObject {
                id: object.compute_id(),
                object,
            });
            pos = next;
        }
        if pos != self.data.len() {
            return Err(PackError::CorruptEntry {
                offset: pos as u64,
                reason: "trailing bytes after last entry".into(),
            });
        }
        Ok(out)
    }

    /// Decode every entry and write it to `store`.
    pub fn unpack_into(&self, store: &dyn ObjectStore) -> PackResult<Vec<ObjectId>> {
        let objects = self.objects()?;
        let batch: Vec<StoredObject> = objects.into_iter().map(|o| o.object).collect();
        Ok(store.write_batch(&batch)?)
    }

    /// Decode the entry at `start`, refusing to inflate past `budget` bytes.
    fn read_at(&self, start: usize, budget: u64) -> PackResult<(StoredObject, usize)> {
        let data = self.data;
        let offset = start as u64;
        let corrupt = |reason: &str| PackError::CorruptEntry {
            offset,
            reason: reason.to_string(),
        };

        let type_byte = *data.get(start).ok_or_else(|| corrupt("offset beyond pack data"))?;
        let kind = ObjectKind::from_type_byte(type_byte)
            .ok_or_else(|| corrupt(&format!("unknown type byte: {type_byte}")))?;
        let mut pos = start + 1;

        let (raw_size, consumed) = decode_varint(&data[pos..], offset)?;
        pos += consumed;
        if raw_size > budget {
            return Err(PackError::TooLarge {
                offset,
                size: raw_size,
                limit: self.max_unpacked,
            });
        }
        let (compressed_size, consumed) = decode_varint(&data[pos..], offset)?;
        pos += consumed;

        let crc_end = pos + 4;
        if crc_end > data.len() {
            return Err(corrupt("truncated checksum"));
        }
        let expected_crc = read_u32(&data[pos..crc_end]);
        pos = crc_end;

        let end = usize::try_from(compressed_size)
            .ok()
            .and_then(|len| pos.checked_add(len))
            .filter(|end| *end <= data.len())
            .ok_or_else(|| corrupt("compressed data extends beyond pack"))?;
        let compressed = &data[pos..end];
        if crc32fast::hash(compressed) != expected_crc {
            return Err(PackError::CrcMismatch { offset });
        }

        // One byte past the declared size is enough to detect a lie.
        let mut decompressed = Vec::new();
        zstd::stream::read::Decoder::new(compressed)
            .and_then(|decoder| decoder.take(raw_size + 1).read_to_end(&mut decompressed))
            .map_err(|e| PackError::DecompressionFailed(e.to_string()))?;
        if decompressed.len() as u64 != raw_size {
            return Err(corrupt(&format!(
                "size mismatch: expected {raw_size}, got {}",
                decompressed.len()
            )));
        }
        Ok((StoredObject::new(kind, decompressed), end))
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_be_bytes(buf)
}
