use tracing::debug;

use convlog_store::{ObjectStore, ObjectStoreExt, StoredObject};
use convlog_types::ObjectId;

use crate::error::{PackError, PackResult};
use crate::varint::encode_varint;
use crate::{MAGIC, VERSION};

/// Builds a pack from a sequence of objects.
#[derive(Debug, Default)]
pub struct PackWriter {
    objects: Vec<StoredObject>,
    raw_bytes: u64,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: StoredObject) {
        self.raw_bytes += object.size;
        self.objects.push(object);
    }

    /// Read `ids` from `store` and queue them in order.
    pub fn add_from_store(&mut self, store: &dyn ObjectStore, ids: &[ObjectId]) -> PackResult<()> {
        for id in ids {
            self.add(store.read_required(id)?);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Total uncompressed size of the queued objects.
    pub fn raw_bytes(&self) -> u64 {
        self.raw_bytes
    }

    /// Encode the pack.
    pub fn finish(self) -> PackResult<Vec<u8>> {
        let mut pack = Vec::with_capacity(crate::HEADER_LEN + crate::TRAILER_LEN);
        pack.extend_from_slice(MAGIC);
        pack.extend_from_slice(&VERSION.to_be_bytes());
        pack.extend_from_slice(&(self.objects.len() as u32).to_be_bytes());

        for object in &self.objects {
            pack.push(object.kind.type_byte());
            let compressed = zstd::encode_all(object.data.as_slice(), 3)
                .map_err(|e| PackError::CompressionFailed(e.to_string()))?;
            encode_varint(&mut pack, object.data.len() as u64);
            encode_varint(&mut pack, compressed.len() as u64);
            pack.extend_from_slice(&crc32fast::hash(&compressed).to_be_bytes());
            pack.extend_from_slice(&compressed);
        }

        let checksum = *blake3::hash(&pack).as_bytes();
        pack.extend_from_slice(&checksum);
        debug!(
            objects = self.objects.len(),
            raw = self.raw_bytes,
            packed = pack.len(),
            "pack written"
        );
        Ok(pack)
    }
}
