//! Selecting the objects a fetching peer lacks.

use std::collections::HashSet;

use tracing::debug;

use convlog_dag::CommitGraph;
use convlog_store::{EntryMode, ObjectStore, ObjectStoreExt};
use convlog_types::ObjectId;

use crate::error::PackResult;

/// Objects reachable from `wants` but not from `haves`, oldest commit
/// first. Each commit's new trees and blobs precede the commit itself.
///
/// Objects reachable from the trees of the `haves` commits are assumed
/// present on the receiver and left out.
pub fn missing_objects(
    store: &dyn ObjectStore,
    wants: &[ObjectId],
    haves: &[ObjectId],
) -> PackResult<Vec<ObjectId>> {
    let mut tips = wants.to_vec();
    tips.extend_from_slice(haves);
    let graph = CommitGraph::load(store, &tips)?;

    let mut seen = HashSet::new();
    for have in haves {
        let commit = store.read_commit(have)?;
        mark_tree(store, &commit.tree, &mut seen)?;
    }

    let mut commits = Vec::new();
    let mut queued = HashSet::new();
    for want in wants {
        for id in graph.commits_between(want, haves)? {
            if queued.insert(id) {
                commits.push(id);
            }
        }
    }

    let mut out = Vec::new();
    for id in &commits {
        let commit = store.read_commit(id)?;
        collect_tree(store, &commit.tree, &mut seen, &mut out)?;
        out.push(*id);
    }
    debug!(
        wants = wants.len(),
        haves = haves.len(),
        commits = commits.len(),
        objects = out.len(),
        "collected missing objects"
    );
    Ok(out)
}

fn mark_tree(store: &dyn ObjectStore, id: &ObjectId, seen: &mut HashSet<ObjectId>) -> PackResult<()> {
    if !seen.insert(*id) {
        return Ok(());
    }
    for entry in store.read_tree(id)?.entries {
        match entry.mode {
            EntryMode::Directory => mark_tree(store, &entry.object_id, seen)?,
            EntryMode::Regular => {
                seen.insert(entry.object_id);
            }
        }
    }
    Ok(())
}

fn collect_tree(
    store: &dyn ObjectStore,
    id: &ObjectId,
    seen: &mut HashSet<ObjectId>,
    out: &mut Vec<ObjectId>,
) -> PackResult<()> {
    if !seen.insert(*id) {
        return Ok(());
    }
    for entry in store.read_tree(id)?.entries {
        match entry.mode {
            EntryMode::Directory => collect_tree(store, &entry.object_id, seen, out)?,
            EntryMode::Regular => {
                if seen.insert(entry.object_id) {
                    out.push(entry.object_id);
                }
            }
        }
    }
    out.push(*id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convlog_crypto::SigningKey;
    use convlog_store::{Author, CommitObject, InMemoryObjectStore, Snapshot};

    fn commit(
        store: &InMemoryObjectStore,
        key: &SigningKey,
        parents: &[ObjectId],
        ts: i64,
        files: &[(&str, &str)],
    ) -> ObjectId {
        let mut snap = Snapshot::new();
        for (path, content) in files {
            snap.put_file(store, *path, content.as_bytes()).unwrap();
        }
        let tree = snap.write(store).unwrap();
        let commit = CommitObject::build(
            tree,
            parents.to_vec(),
            Author {
                name: "a".into(),
                device: key.fingerprint(),
            },
            ts,
            "{}".into(),
            |p| key.sign(p),
        )
        .unwrap();
        store.write_commit(&commit).unwrap()
    }

    #[test]
    fn full_clone_includes_everything() {
        let store = InMemoryObjectStore::new();
        let key = SigningKey::generate();
        let root = commit(&store, &key, &[], 1, &[("admins/a.crt", "a")]);
        let tip = commit(&store, &key, &[root], 2, &[("admins/a.crt", "a"), ("devices/d.crt", "d")]);

        let objects = missing_objects(&store, &[tip], &[]).unwrap();
        assert_eq!(objects.len(), store.len());
        let root_pos = objects.iter().position(|id| *id == root).unwrap();
        let tip_pos = objects.iter().position(|id| *id == tip).unwrap();
        assert!(root_pos < tip_pos);
    }

    #[test]
    fn haves_prune_shared_objects() {
        let store = InMemoryObjectStore::new();
        let key = SigningKey::generate();
        let root = commit(&store, &key, &[], 1, &[("admins/a.crt", "a")]);
        let tip = commit(&store, &key, &[root], 2, &[("admins/a.crt", "a"), ("profile.vcf", "p")]);

        let objects = missing_objects(&store, &[tip], &[root]).unwrap();
        assert!(!objects.contains(&root));
        assert!(objects.contains(&tip));
        let shared = store.write_blob(b"a").unwrap();
        assert!(!objects.contains(&shared));
        let fresh = store.write_blob(b"p").unwrap();
        assert!(objects.contains(&fresh));
    }

    #[test]
    fn nothing_missing_when_up_to_date() {
        let store = InMemoryObjectStore::new();
        let key = SigningKey::generate();
        let root = commit(&store, &key, &[], 1, &[("a", "1")]);
        assert!(missing_objects(&store, &[root], &[root]).unwrap().is_empty());
    }
}
