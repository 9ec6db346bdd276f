//! Flattened view of a tree: every file path mapped to its blob id.
//!
//! Conversation rules talk about paths (`devices/<id>.crt`,
//! `votes/ban/members/<uri>/<voter>`), so trees are loaded into a
//! [`Snapshot`], edited as a flat map, and written back as nested trees.

use std::collections::BTreeMap;

use convlog_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::{EntryMode, Tree, TreeEntry};
use crate::traits::{ObjectStore, ObjectStoreExt};

/// Most path components a snapshot holds. The deepest conversation path,
/// `votes/<dir>/<kind>/<target>/<voter>`, has five.
pub const MAX_TREE_DEPTH: usize = 8;

/// The complete set of files reachable from one tree.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    files: BTreeMap<String, ObjectId>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and flatten the tree `tree_id`.
    pub fn load(store: &dyn ObjectStore, tree_id: &ObjectId) -> StoreResult<Self> {
        let mut files = BTreeMap::new();
        load_into(store, tree_id, &mut files)?;
        Ok(Self { files })
    }

    /// Write nested trees for this snapshot and return the root tree id.
    pub fn write(&self, store: &dyn ObjectStore) -> StoreResult<ObjectId> {
        let flat: Vec<(&str, ObjectId)> =
            self.files.iter().map(|(p, id)| (p.as_str(), *id)).collect();
        write_level(store, &flat)
    }

    pub fn get(&self, path: &str) -> Option<&ObjectId> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, blob: ObjectId) -> StoreResult<()> {
        let path = path.into();
        if path.is_empty()
            || path.split('/').any(str::is_empty)
            || path.split('/').count() > MAX_TREE_DEPTH
        {
            return Err(StoreError::InvalidPath(path));
        }
        self.files.insert(path, blob);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Option<ObjectId> {
        self.files.remove(path)
    }

    /// Write `data` as a blob and place it at `path`.
    pub fn put_file(
        &mut self,
        store: &dyn ObjectStore,
        path: impl Into<String>,
        data: &[u8],
    ) -> StoreResult<ObjectId> {
        let id = store.write_blob(data)?;
        self.insert(path, id)?;
        Ok(id)
    }

    /// Content of the file at `path`, if present.
    pub fn read_file(&self, store: &dyn ObjectStore, path: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.files.get(path) {
            Some(id) => store.read_blob(id).map(Some),
            None => Ok(None),
        }
    }

    /// Names of the files directly inside `dir` (no recursion).
    pub fn list_dir(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.files
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, _)| {
                let rest = &path[prefix.len()..];
                (!rest.contains('/')).then(|| rest.to_string())
            })
            .collect()
    }

    /// Paths under `prefix`, recursively.
    pub fn paths_under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.files
            .range(prefix.to_string()..)
            .take_while(move |(path, _)| path.starts_with(prefix))
            .map(|(path, _)| path.as_str())
    }

    /// Remove every path under `prefix`; returns the removed paths.
    pub fn remove_under(&mut self, prefix: &str) -> Vec<String> {
        let doomed: Vec<String> = self.paths_under(prefix).map(str::to_string).collect();
        for path in &doomed {
            self.files.remove(path);
        }
        doomed
    }

    pub fn files(&self) -> &BTreeMap<String, ObjectId> {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FromIterator<(String, ObjectId)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, ObjectId)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

fn load_into(
    store: &dyn ObjectStore,
    root: &ObjectId,
    files: &mut BTreeMap<String, ObjectId>,
) -> StoreResult<()> {
    let mut pending = vec![(*root, String::new(), 0usize)];
    while let Some((tree_id, prefix, depth)) = pending.pop() {
        let tree = store.read_tree(&tree_id)?;
        for entry in &tree.entries {
            let path = format!("{prefix}{}", entry.name);
            match entry.mode {
                EntryMode::Regular => {
                    files.insert(path, entry.object_id);
                }
                EntryMode::Directory if depth + 1 >= MAX_TREE_DEPTH => {
                    return Err(StoreError::CorruptObject {
                        id: tree_id,
                        reason: format!("{path}/ nested deeper than {MAX_TREE_DEPTH} levels"),
                    });
                }
                EntryMode::Directory => {
                    pending.push((entry.object_id, format!("{path}/"), depth + 1));
                }
            }
        }
    }
    Ok(())
}

/// `flat` is sorted by path, relative to the directory being written.
fn write_level(store: &dyn ObjectStore, flat: &[(&str, ObjectId)]) -> StoreResult<ObjectId> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < flat.len() {
        let (path, id) = flat[i];
        match path.split_once('/') {
            None => {
                entries.push(TreeEntry::new(EntryMode::Regular, path, id));
                i += 1;
            }
            Some((dir, _)) => {
                let children: Vec<(&str, ObjectId)> = flat[i..]
                    .iter()
                    .map_while(|(p, id)| {
                        p.split_once('/')
                            .filter(|(d, _)| *d == dir)
                            .map(|(_, rest)| (rest, *id))
                    })
                    .collect();
                i += children.len();
                let sub = write_level(store, &children)?;
                entries.push(TreeEntry::new(EntryMode::Directory, dir, sub));
            }
        }
    }
    store.write_tree(&Tree::new(entries))
}
