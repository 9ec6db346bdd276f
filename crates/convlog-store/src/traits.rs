use convlog_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{Blob, CommitObject, StoredObject, Tree};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same data always produces the
///   same ID.
/// - Concurrent reads are always safe.
/// - The store never interprets object contents.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore: Send + Sync {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    ///
    /// If the object already exists, this is a no-op (idempotent).
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool>;

    /// Delete an object by ID. Returns `true` if the object existed.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool>;

    /// IDs of every stored object, sorted.
    fn all_ids(&self) -> StoreResult<Vec<ObjectId>>;

    /// Write multiple objects in a batch and return their IDs.
    fn write_batch(&self, objects: &[StoredObject]) -> StoreResult<Vec<ObjectId>> {
        objects.iter().map(|obj| self.write(obj)).collect()
    }

    /// Remove every object. Used when a conversation is erased.
    fn clear(&self) -> StoreResult<usize> {
        let ids = self.all_ids()?;
        let mut removed = 0;
        for id in &ids {
            if self.delete(id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Typed helpers over any [`ObjectStore`].
pub trait ObjectStoreExt: ObjectStore {
    /// Read an object that must exist.
    fn read_required(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.read(id)?.ok_or(StoreError::NotFound(*id))
    }

    fn read_blob(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        Ok(Blob::from_stored_object(&self.read_required(id)?)?.data)
    }

    fn read_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        Tree::from_stored_object(&self.read_required(id)?)
    }

    fn read_commit(&self, id: &ObjectId) -> StoreResult<CommitObject> {
        CommitObject::from_stored_object(&self.read_required(id)?)
    }

    fn write_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
        self.write(&Blob::new(data.to_vec()).to_stored_object())
    }

    fn write_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
        self.write(&tree.to_stored_object()?)
    }

    fn write_commit(&self, commit: &CommitObject) -> StoreResult<ObjectId> {
        self.write(&commit.to_stored_object()?)
    }
}

impl<T: ObjectStore + ?Sized> ObjectStoreExt for T {}
