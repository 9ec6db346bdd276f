//! Write-aside overlay used while fetched objects are still unvalidated.
//!
//! [`StagedObjectStore`] reads through to a base store but keeps every
//! write in memory. Dropping it discards the writes; [`StagedObjectStore::apply`]
//! copies them into the base.

use std::collections::BTreeSet;

use tracing::debug;

use convlog_types::ObjectId;

use crate::error::StoreResult;
use crate::memory::InMemoryObjectStore;
use crate::object::StoredObject;
use crate::traits::ObjectStore;

pub struct StagedObjectStore<'a> {
    base: &'a dyn ObjectStore,
    staged: InMemoryObjectStore,
}

impl<'a> StagedObjectStore<'a> {
    pub fn new(base: &'a dyn ObjectStore) -> Self {
        Self {
            base,
            staged: InMemoryObjectStore::new(),
        }
    }

    /// Number of objects not present in the base.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Copy the staged objects into the base store.
    pub fn apply(self) -> StoreResult<usize> {
        let ids = self.staged.all_ids()?;
        let mut objects = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(object) = self.staged.read(id)? {
                objects.push(object);
            }
        }
        self.base.write_batch(&objects)?;
        debug!(objects = objects.len(), "applied staged objects");
        Ok(objects.len())
    }
}

impl ObjectStore for StagedObjectStore<'_> {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        match self.staged.read(id)? {
            Some(object) => Ok(Some(object)),
            None => self.base.read(id),
        }
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if self.base.exists(&id)? {
            return Ok(id);
        }
        self.staged.write(object)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.staged.exists(id)? || self.base.exists(id)?)
    }

    /// Only staged objects can be deleted.
    fn delete(&self, id: &ObjectId) -> StoreResult<bool> {
        self.staged.delete(id)
    }

    fn all_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids: BTreeSet<ObjectId> = self.base.all_ids()?.into_iter().collect();
        ids.extend(self.staged.all_ids()?);
        Ok(ids.into_iter().collect())
    }
}
