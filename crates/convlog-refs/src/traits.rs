//! The [`RefStore`] trait defining the reference storage interface.

use convlog_types::ObjectId;

use crate::error::RefResult;
use crate::types::{branch_ref_name, Ref, MAIN_BRANCH};

/// Storage backend for named references.
///
/// Implementations must be thread-safe (`Send + Sync`). The namespace is:
///
/// - `refs/heads/*` for branches
/// - `refs/remotes/{device}/*` for remote tracking refs
pub trait RefStore: Send + Sync {
    /// Read a ref by its canonical name. `Ok(None)` if absent.
    fn read_ref(&self, name: &str) -> RefResult<Option<Ref>>;

    /// Create or overwrite a ref unconditionally.
    fn write_ref(&self, name: &str, reference: &Ref) -> RefResult<()>;

    /// Delete a ref. Returns whether it existed.
    fn delete_ref(&self, name: &str) -> RefResult<bool>;

    /// All refs whose canonical name starts with `prefix`, sorted by name.
    fn list_refs(&self, prefix: &str) -> RefResult<Vec<(String, Ref)>>;

    /// Write `new` only if the ref currently targets `expected`
    /// (`None` meaning "does not exist yet").
    ///
    /// Fails with [`RefError::Stale`](crate::RefError::Stale) otherwise, so
    /// two local writers can never both advance from the same head.
    fn compare_and_swap(&self, name: &str, expected: Option<ObjectId>, new: &Ref) -> RefResult<()>;

    /// Target of `refs/heads/main`, or `None` while the branch is unborn.
    fn head(&self) -> RefResult<Option<ObjectId>> {
        Ok(self
            .read_ref(&branch_ref_name(MAIN_BRANCH))?
            .map(|r| r.target()))
    }

    /// All known remote names.
    fn remotes(&self) -> RefResult<Vec<String>> {
        let refs = self.list_refs("refs/remotes/")?;
        let mut remotes: Vec<String> = refs
            .iter()
            .filter_map(|(name, _)| {
                let rest = name.strip_prefix("refs/remotes/")?;
                Some(rest.split('/').next()?.to_string())
            })
            .collect();
        remotes.dedup();
        Ok(remotes)
    }

    /// Delete every ref.
    fn clear(&self) -> RefResult<usize> {
        let refs = self.list_refs("")?;
        for (name, _) in &refs {
            self.delete_ref(name)?;
        }
        Ok(refs.len())
    }
}
