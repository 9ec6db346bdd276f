//! In-memory reference store.
//!
//! [`InMemoryRefStore`] keeps all refs in a `HashMap` behind a `RwLock`.
//! Compare-and-swap holds the write lock across the check and the update.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use convlog_types::ObjectId;

use crate::error::{RefError, RefResult};
use crate::names::{validate_branch_name, validate_remote_name};
use crate::traits::RefStore;
use crate::types::Ref;

/// An in-memory implementation of [`RefStore`].
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<HashMap<String, Ref>>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_map(&self) -> RefResult<RwLockReadGuard<'_, HashMap<String, Ref>>> {
        self.refs
            .read()
            .map_err(|e| RefError::Storage(format!("lock poisoned: {e}")))
    }

    fn write_map(&self) -> RefResult<RwLockWriteGuard<'_, HashMap<String, Ref>>> {
        self.refs
            .write()
            .map_err(|e| RefError::Storage(format!("lock poisoned: {e}")))
    }
}

fn validate(name: &str, reference: &Ref) -> RefResult<()> {
    match reference {
        Ref::Branch { name: branch, .. } => validate_branch_name(branch)?,
        Ref::Remote { remote, branch, .. } => {
            validate_remote_name(remote)?;
            validate_branch_name(branch)?;
        }
    }
    if name != reference.canonical_name() {
        return Err(RefError::InvalidName {
            name: name.to_string(),
            reason: format!("does not match {}", reference.canonical_name()),
        });
    }
    Ok(())
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> RefResult<Option<Ref>> {
        Ok(self.read_map()?.get(name).cloned())
    }

    fn write_ref(&self, name: &str, reference: &Ref) -> RefResult<()> {
        validate(name, reference)?;
        self.write_map()?.insert(name.to_string(), reference.clone());
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> RefResult<bool> {
        Ok(self.write_map()?.remove(name).is_some())
    }

    fn list_refs(&self, prefix: &str) -> RefResult<Vec<(String, Ref)>> {
        let refs = self.read_map()?;
        let mut result: Vec<(String, Ref)> = refs
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    fn compare_and_swap(&self, name: &str, expected: Option<ObjectId>, new: &Ref) -> RefResult<()> {
        validate(name, new)?;
        let mut refs = self.write_map()?;
        let actual = refs.get(name).map(Ref::target);
        if actual != expected {
            return Err(RefError::Stale {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        debug!(name, target = %new.target().short_hex(), "advanced ref");
        refs.insert(name.to_string(), new.clone());
        Ok(())
    }
}
