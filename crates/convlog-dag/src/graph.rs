//! The commit graph and its traversal algorithms.
//!
//! [`CommitGraph`] holds the parent pointers and timestamps of every commit
//! reachable from the tips it was loaded from, plus a child index for
//! walking toward descendants. Commits are content-addressed and cannot
//! reference objects created after them, so the graph is acyclic.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use tracing::debug;

use convlog_store::{ObjectStore, ObjectStoreExt, StoreError};
use convlog_types::ObjectId;

use crate::error::{DagError, DagResult};

/// Parent pointers and timestamp of one commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphNode {
    pub id: ObjectId,
    pub parents: Vec<ObjectId>,
    pub timestamp: i64,
}

/// Commits reachable from a set of tips.
#[derive(Clone, Debug, Default)]
pub struct CommitGraph {
    nodes: HashMap<ObjectId, GraphNode>,
    children: HashMap<ObjectId, Vec<ObjectId>>,
}

impl CommitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every commit reachable from `tips`.
    pub fn load(store: &dyn ObjectStore, tips: &[ObjectId]) -> DagResult<Self> {
        let mut graph = Self::new();
        graph.extend(store, tips)?;
        Ok(graph)
    }

    /// Load the commits reachable from `tips` that are not loaded yet.
    pub fn extend(&mut self, store: &dyn ObjectStore, tips: &[ObjectId]) -> DagResult<()> {
        let mut queue: VecDeque<ObjectId> = tips
            .iter()
            .filter(|id| !self.nodes.contains_key(id))
            .copied()
            .collect();
        let mut loaded = 0usize;

        while let Some(id) = queue.pop_front() {
            if self.nodes.contains_key(&id) {
                continue;
            }
            let commit = match store.read_commit(&id) {
                Ok(commit) => commit,
                Err(StoreError::NotFound(_)) => return Err(DagError::MissingCommit(id)),
                Err(e) => return Err(e.into()),
            };
            for parent in &commit.parents {
                self.children.entry(*parent).or_default().push(id);
                if !self.nodes.contains_key(parent) {
                    queue.push_back(*parent);
                }
            }
            self.nodes.insert(
                id,
                GraphNode {
                    id,
                    parents: commit.parents,
                    timestamp: commit.timestamp,
                },
            );
            loaded += 1;
        }

        debug!(loaded, total = self.nodes.len(), "loaded commit graph");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &ObjectId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    fn require(&self, id: &ObjectId) -> DagResult<&GraphNode> {
        self.nodes.get(id).ok_or(DagError::NodeNotFound(*id))
    }

    /// Commits without parents. A well-formed conversation has exactly one.
    pub fn roots(&self) -> Vec<ObjectId> {
        let mut roots: Vec<ObjectId> = self
            .nodes
            .values()
            .filter(|n| n.parents.is_empty())
            .map(|n| n.id)
            .collect();
        roots.sort();
        roots
    }

    /// Loaded children of `id`.
    pub fn children(&self, id: &ObjectId) -> &[ObjectId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    // ---------------------------------------------------------------
    // Ancestry
    // ---------------------------------------------------------------

    /// `id` and all of its loaded ancestors.
    pub fn ancestors(&self, id: &ObjectId) -> HashSet<ObjectId> {
        self.ancestors_of(std::slice::from_ref(id))
    }

    fn ancestors_of(&self, ids: &[ObjectId]) -> HashSet<ObjectId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        for id in ids {
            if self.nodes.contains_key(id) && visited.insert(*id) {
                queue.push_back(*id);
            }
        }
        while let Some(current) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&current) {
                for parent in &node.parents {
                    if visited.insert(*parent) {
                        queue.push_back(*parent);
                    }
                }
            }
        }
        visited
    }

    /// `true` when `ancestor` is `descendant` or one of its ancestors.
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> bool {
        if ancestor == descendant {
            return self.nodes.contains_key(ancestor);
        }
        if !self.nodes.contains_key(ancestor) {
            return false;
        }
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([*descendant]);
        while let Some(current) = queue.pop_front() {
            if current == *ancestor {
                return true;
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            for parent in &node.parents {
                if visited.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }
        false
    }

    /// Best common ancestor of `a` and `b`.
    ///
    /// Among the common ancestors, those that are ancestors of another
    /// common ancestor are discarded. If several remain (criss-cross
    /// history), the most recent one wins, then the greatest id.
    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> DagResult<Option<ObjectId>> {
        self.require(a)?;
        self.require(b)?;
        if a == b {
            return Ok(Some(*a));
        }

        let ancestors_a = self.ancestors(a);
        let ancestors_b = self.ancestors(b);
        let common: HashSet<ObjectId> =
            ancestors_a.intersection(&ancestors_b).copied().collect();

        let mut dominated = HashSet::new();
        for id in &common {
            if let Some(node) = self.nodes.get(id) {
                dominated.extend(self.ancestors_of(&node.parents));
            }
        }

        let base = common
            .iter()
            .filter(|id| !dominated.contains(id))
            .filter_map(|id| self.nodes.get(id))
            .max_by_key(|node| (node.timestamp, node.id))
            .map(|node| node.id);

        debug!(
            a = %a.short_hex(),
            b = %b.short_hex(),
            base = ?base.map(|id| id.short_hex()),
            "computed merge base"
        );
        Ok(base)
    }

    // ---------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------

    /// Walk from `from` toward the root, children before parents.
    ///
    /// Among the commits whose loaded children have all been yielded, the
    /// most recent goes first (ties by greater id). The walk does not enter
    /// `stop` or any of its ancestors.
    pub fn reverse_topological(
        &self,
        from: &ObjectId,
        stop: &[ObjectId],
    ) -> DagResult<Vec<ObjectId>> {
        self.require(from)?;
        let excluded = self.ancestors_of(stop);
        let reachable: HashSet<ObjectId> = self
            .ancestors(from)
            .into_iter()
            .filter(|id| !excluded.contains(id))
            .collect();
        if reachable.is_empty() {
            return Ok(Vec::new());
        }

        // Remaining children inside the walked set, per commit.
        let mut pending: HashMap<ObjectId, usize> = reachable
            .iter()
            .map(|id| {
                let count = self
                    .children(id)
                    .iter()
                    .filter(|c| reachable.contains(c))
                    .count();
                (*id, count)
            })
            .collect();

        let mut ready: BinaryHeap<(i64, ObjectId)> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .filter_map(|(id, _)| self.nodes.get(id))
            .map(|node| (node.timestamp, node.id))
            .collect();

        let mut order = Vec::with_capacity(reachable.len());
        while let Some((_, id)) = ready.pop() {
            order.push(id);
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            for parent in &node.parents {
                if let Some(count) = pending.get_mut(parent) {
                    *count -= 1;
                    if *count == 0 {
                        if let Some(p) = self.nodes.get(parent) {
                            ready.push((p.timestamp, p.id));
                        }
                    }
                }
            }
        }
        Ok(order)
    }

    /// Commits reachable from `tip` but not from any of `bases`, oldest
    /// first: every commit comes after all of its parents.
    pub fn commits_between(&self, tip: &ObjectId, bases: &[ObjectId]) -> DagResult<Vec<ObjectId>> {
        let mut order = self.reverse_topological(tip, bases)?;
        order.reverse();
        Ok(order)
    }

    /// Loaded commits ordered parents first, ties by timestamp then id.
    pub fn topological_order(&self) -> Vec<ObjectId> {
        let mut in_degree: HashMap<ObjectId, usize> = self
            .nodes
            .values()
            .map(|n| {
                let loaded = n.parents.iter().filter(|p| self.nodes.contains_key(p)).count();
                (n.id, loaded)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(i64, ObjectId)>> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .filter_map(|(id, _)| self.nodes.get(id))
            .map(|n| Reverse((n.timestamp, n.id)))
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            result.push(id);
            for child in self.children(&id) {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        if let Some(n) = self.nodes.get(child) {
                            ready.push(Reverse((n.timestamp, n.id)));
                        }
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convlog_crypto::SigningKey;
    use convlog_store::{Author, CommitObject, InMemoryObjectStore, Tree};

    struct Fixture {
        store: InMemoryObjectStore,
        key: SigningKey,
        tree: ObjectId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = InMemoryObjectStore::new();
            let tree = store.write_tree(&Tree::empty()).unwrap();
            Self {
                store,
                key: SigningKey::generate(),
                tree,
            }
        }

        fn commit(&self, parents: &[ObjectId], timestamp: i64, body: &str) -> ObjectId {
            let commit = CommitObject::build(
                self.tree,
                parents.to_vec(),
                Author {
                    name: "alice".into(),
                    device: self.key.fingerprint(),
                },
                timestamp,
                format!(r#"{{"type":"text/plain","body":"{body}"}}"#),
                |payload| self.key.sign(payload),
            )
            .unwrap();
            self.store.write_commit(&commit).unwrap()
        }
    }

    // ---- Test 1: Linear chain ancestry ----
    #[test]
    fn linear_chain_ancestry() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 1, "root");
        let a = fx.commit(&[root], 2, "a");
        let b = fx.commit(&[a], 3, "b");

        let graph = CommitGraph::load(&fx.store, &[b]).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.roots(), vec![root]);
        assert!(graph.is_ancestor(&root, &b));
        assert!(graph.is_ancestor(&b, &b));
        assert!(!graph.is_ancestor(&b, &a));
        assert_eq!(graph.ancestors(&a), HashSet::from([root, a]));
    }

    // ---- Test 2: Missing parent is reported ----
    #[test]
    fn missing_commit_reported() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 1, "root");
        let child = fx.commit(&[root], 2, "child");
        fx.store.delete(&root).unwrap();

        let err = CommitGraph::load(&fx.store, &[child]).unwrap_err();
        assert!(matches!(err, DagError::MissingCommit(id) if id == root));
    }

    // ---- Test 3: Merge base of a fork ----
    #[test]
    fn merge_base_of_fork() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 1, "root");
        let base = fx.commit(&[root], 2, "base");
        let left = fx.commit(&[base], 3, "left");
        let right = fx.commit(&[base], 4, "right");

        let graph = CommitGraph::load(&fx.store, &[left, right]).unwrap();
        assert_eq!(graph.merge_base(&left, &right).unwrap(), Some(base));
        assert_eq!(graph.merge_base(&left, &base).unwrap(), Some(base));
        assert_eq!(graph.merge_base(&left, &left).unwrap(), Some(left));
    }

    // ---- Test 4: Merge base skips dominated common ancestors ----
    #[test]
    fn merge_base_after_previous_merge() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 1, "root");
        let left = fx.commit(&[root], 2, "left");
        let right = fx.commit(&[root], 3, "right");
        let merged = fx.commit(&[left, right], 4, "merge");
        let after_left = fx.commit(&[merged], 5, "l2");
        let after_right = fx.commit(&[right], 6, "r2");

        let graph = CommitGraph::load(&fx.store, &[after_left, after_right]).unwrap();
        assert_eq!(graph.merge_base(&after_left, &after_right).unwrap(), Some(right));
    }

    // ---- Test 5: Reverse topological walk puts children first ----
    #[test]
    fn reverse_topological_children_first() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 1, "root");
        let left = fx.commit(&[root], 5, "left");
        let right = fx.commit(&[root], 3, "right");
        let merged = fx.commit(&[left, right], 6, "merge");

        let graph = CommitGraph::load(&fx.store, &[merged]).unwrap();
        let order = graph.reverse_topological(&merged, &[]).unwrap();
        assert_eq!(order, vec![merged, left, right, root]);

        let stopped = graph.reverse_topological(&merged, &[right]).unwrap();
        assert_eq!(stopped, vec![merged, left]);
    }

    // ---- Test 6: Commits between are oldest first ----
    #[test]
    fn commits_between_oldest_first() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 1, "root");
        let a = fx.commit(&[root], 2, "a");
        let b = fx.commit(&[a], 3, "b");
        let c = fx.commit(&[b], 4, "c");

        let graph = CommitGraph::load(&fx.store, &[c]).unwrap();
        assert_eq!(graph.commits_between(&c, &[a]).unwrap(), vec![b, c]);
        assert_eq!(graph.commits_between(&c, &[]).unwrap(), vec![root, a, b, c]);
        assert!(graph.commits_between(&a, &[c]).unwrap().is_empty());
    }

    // ---- Test 7: Topological order respects parents ----
    #[test]
    fn topological_order_parents_first() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 10, "root");
        // Clock skew: the child claims an earlier time than its parent.
        let skewed = fx.commit(&[root], 1, "skewed");
        let later = fx.commit(&[skewed], 20, "later");

        let graph = CommitGraph::load(&fx.store, &[later]).unwrap();
        assert_eq!(graph.topological_order(), vec![root, skewed, later]);
        assert_eq!(graph.reverse_topological(&later, &[]).unwrap(), vec![later, skewed, root]);
    }

    // ---- Test 8: Extend loads only new commits ----
    #[test]
    fn extend_adds_new_tips() {
        let fx = Fixture::new();
        let root = fx.commit(&[], 1, "root");
        let a = fx.commit(&[root], 2, "a");
        let mut graph = CommitGraph::load(&fx.store, &[a]).unwrap();
        let b = fx.commit(&[a], 3, "b");
        graph.extend(&fx.store, &[b]).unwrap();
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.children(&a), &[b]);
        assert!(matches!(
            graph.merge_base(&b, &ObjectId::from_bytes(b"nope")),
            Err(DagError::NodeNotFound(_))
        ));
    }
}
