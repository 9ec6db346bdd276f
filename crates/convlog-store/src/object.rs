use serde::{Deserialize, Serialize};
use convlog_crypto::{ContentHasher, Signature};
use convlog_types::ObjectId;

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content (file contents, arbitrary data).
    Blob,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// Signed commit pointing at a tree and its parents.
    Commit,
}

impl ObjectKind {
    /// Single-byte tag used by on-disk and packed encodings.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Blob => 1,
            Self::Tree => 2,
            Self::Commit => 3,
        }
    }

    pub fn from_type_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Blob),
            2 => Some(Self::Tree),
            3 => Some(Self::Commit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// A stored object: kind tag + serialized data + cached size.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// contents of the data; it is a pure key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    pub size: u64,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self { kind, data, size }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        let hasher = match self.kind {
            ObjectKind::Blob => &ContentHasher::BLOB,
            ObjectKind::Tree => &ContentHasher::TREE,
            ObjectKind::Commit => &ContentHasher::COMMIT,
        };
        hasher.hash(&self.data)
    }

    fn expect_kind(&self, kind: ObjectKind) -> StoreResult<()> {
        if self.kind != kind {
            return Err(StoreError::CorruptObject {
                id: self.compute_id(),
                reason: format!("expected {kind}, got {}", self.kind),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object (analogous to git blob).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Blob)?;
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file.
    Regular,
    /// Subtree / directory.
    Directory,
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub object_id: ObjectId,
}

impl TreeEntry {
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name)
    }
}

/// Directory listing object (analogous to git tree).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    /// Sorted entries in this directory.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries.
    ///
    /// Entries are sorted by name for deterministic hashing.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Tree, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Tree)?;
        serde_json::from_slice(&obj.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Who produced a commit: a display name and the signing device id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub device: String,
}

/// A signed commit.
///
/// The signature covers [`CommitObject::signing_payload`], the JSON encoding
/// of every other field. The commit id covers the signature too, so flipping
/// one signature byte yields a different (and invalid) commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitObject {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Author,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
    /// Compact JSON metadata; always carries a `type` key.
    pub message: String,
    pub signature: Signature,
}

#[derive(Serialize)]
struct CommitPayload<'a> {
    tree: &'a ObjectId,
    parents: &'a [ObjectId],
    author: &'a Author,
    timestamp: i64,
    message: &'a str,
}

impl CommitObject {
    /// Build and sign a commit. `sign` receives the exact payload bytes.
    pub fn build(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Author,
        timestamp: i64,
        message: String,
        sign: impl FnOnce(&[u8]) -> Signature,
    ) -> StoreResult<Self> {
        let payload = encode_payload(&CommitPayload {
            tree: &tree,
            parents: &parents,
            author: &author,
            timestamp,
            message: &message,
        })?;
        let signature = sign(&payload);
        Ok(Self {
            tree,
            parents,
            author,
            timestamp,
            message,
            signature,
        })
    }

    /// The bytes the author signed.
    pub fn signing_payload(&self) -> StoreResult<Vec<u8>> {
        encode_payload(&CommitPayload {
            tree: &self.tree,
            parents: &self.parents,
            author: &self.author,
            timestamp: self.timestamp,
            message: &self.message,
        })
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() == 2
    }

    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let data =
            serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(StoredObject::new(ObjectKind::Commit, data))
    }

    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Commit)?;
        let commit: Self = serde_json::from_slice(&obj.data)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if commit.parents.len() > 2 {
            return Err(StoreError::CorruptObject {
                id: obj.compute_id(),
                reason: format!("{} parents", commit.parents.len()),
            });
        }
        Ok(commit)
    }
}

fn encode_payload(payload: &CommitPayload<'_>) -> StoreResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use convlog_crypto::SigningKey;

    fn signed_commit(key: &SigningKey, parents: Vec<ObjectId>) -> CommitObject {
        CommitObject::build(
            ObjectId::from_bytes(b"tree"),
            parents,
            Author {
                name: "alice".into(),
                device: key.fingerprint(),
            },
            1_700_000_000,
            r#"{"type":"text/plain","body":"hi"}"#.into(),
            |payload| key.sign(payload),
        )
        .unwrap()
    }

    #[test]
    fn blob_kind_mismatch() {
        let stored = StoredObject::new(ObjectKind::Tree, b"not a blob".to_vec());
        let err = Blob::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn tree_entries_sorted() {
        let tree = Tree::new(vec![
            TreeEntry::new(EntryMode::Regular, "profile.vcf", ObjectId::null()),
            TreeEntry::new(EntryMode::Directory, "admins", ObjectId::null()),
            TreeEntry::new(EntryMode::Directory, "devices", ObjectId::null()),
        ]);
        let names: Vec<&str> = tree.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["admins", "devices", "profile.vcf"]);
        assert!(tree.get("devices").is_some());
        assert!(tree.get("members").is_none());
    }

    #[test]
    fn commit_signature_covers_payload() {
        let key = SigningKey::generate();
        let commit = signed_commit(&key, vec![]);
        let payload = commit.signing_payload().unwrap();
        assert!(key.verifying_key().verify(&payload, &commit.signature).is_ok());

        let mut edited = commit.clone();
        edited.message = r#"{"type":"text/plain","body":"bye"}"#.into();
        let payload = edited.signing_payload().unwrap();
        assert!(key.verifying_key().verify(&payload, &edited.signature).is_err());
    }

    #[test]
    fn commit_id_covers_signature() {
        let key = SigningKey::generate();
        let commit = signed_commit(&key, vec![ObjectId::from_bytes(b"parent")]);
        let mut bytes = commit.signature.to_bytes();
        bytes[10] ^= 0xff;
        let mut tampered = commit.clone();
        tampered.signature = Signature::from_bytes(&bytes);
        assert_ne!(
            commit.to_stored_object().unwrap().compute_id(),
            tampered.to_stored_object().unwrap().compute_id()
        );
    }

    #[test]
    fn commit_decode_rejects_three_parents() {
        let key = SigningKey::generate();
        let parents = (0u8..3).map(|i| ObjectId::from_bytes(&[i])).collect();
        let stored = signed_commit(&key, parents).to_stored_object().unwrap();
        let err = CommitObject::from_stored_object(&stored).unwrap_err();
        assert!(matches!(err, StoreError::CorruptObject { .. }));
    }

    #[test]
    fn type_bytes_roundtrip() {
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::Commit] {
            assert_eq!(ObjectKind::from_type_byte(kind.type_byte()), Some(kind));
        }
        assert_eq!(ObjectKind::from_type_byte(0), None);
    }
}
