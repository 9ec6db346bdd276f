//! Log and search walks.

use tracing::debug;

use convlog_dag::CommitGraph;
use convlog_membership::DeviceOwnerCache;
use convlog_store::{CommitObject, ObjectStore, ObjectStoreExt, Snapshot};
use convlog_types::ObjectId;
use convlog_validator::CommitMessage;

use crate::error::{HistoryError, HistoryResult};
use crate::filter::Filter;
use crate::record::CommitRecord;

/// Range and limits of a log walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Start of the walk; the caller's head when `None`.
    pub from: Option<ObjectId>,
    /// The walk stops when it reaches this commit.
    pub to: Option<ObjectId>,
    pub max_count: Option<usize>,
    pub skip_merges: bool,
    /// Yield `to` itself before stopping.
    pub include_to: bool,
    /// Only commits whose author device belongs to this uri.
    pub author_uri: Option<String>,
    /// Skip the linearized-parent annotation.
    pub fast: bool,
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from(mut self, id: ObjectId) -> Self {
        self.from = Some(id);
        self
    }

    pub fn to(mut self, id: ObjectId) -> Self {
        self.to = Some(id);
        self
    }

    pub fn max_count(mut self, n: usize) -> Self {
        self.max_count = Some(n);
        self
    }
}

/// Runs walks over one conversation's object store.
pub struct History<'a> {
    store: &'a dyn ObjectStore,
    cache: &'a DeviceOwnerCache,
}

impl<'a> History<'a> {
    pub fn new(store: &'a dyn ObjectStore, cache: &'a DeviceOwnerCache) -> Self {
        Self { store, cache }
    }

    /// Commits from `head` (or `opts.from`) back toward the root.
    pub fn log(&self, head: &ObjectId, opts: &LogOptions) -> HistoryResult<Vec<CommitRecord>> {
        let from = opts.from.unwrap_or(*head);
        let order = self.walk(&from)?;

        let mut records: Vec<CommitRecord> = Vec::new();
        // One record past the limit, to annotate the last yielded one.
        let limit = opts.max_count.map(|n| n + 1);
        for id in order {
            let reached_end = opts.to == Some(id);
            if reached_end && !opts.include_to {
                break;
            }
            if limit.is_some_and(|limit| records.len() >= limit) {
                break;
            }
            let record = self.record(&id)?;
            let keep = !(opts.skip_merges && record.is_merge())
                && opts
                    .author_uri
                    .as_ref()
                    .map_or(true, |uri| record.author_uri.as_ref() == Some(uri));
            if keep {
                records.push(record);
            }
            if reached_end {
                break;
            }
        }

        if !opts.fast {
            link(&mut records);
        }
        if let Some(max) = opts.max_count {
            records.truncate(max);
        }
        debug!(from = %from.short_hex(), count = records.len(), "log walk");
        Ok(records)
    }

    /// Matching records from `head` back toward the root, newest first.
    ///
    /// Until a merge is met the walk is a single chain, so it stops at the
    /// first commit older than `filter.after`.
    pub fn search(&self, head: &ObjectId, filter: &Filter) -> HistoryResult<Vec<CommitRecord>> {
        let mut found = Vec::new();
        if filter.is_full(0) {
            return Ok(found);
        }
        let mut linear = true;
        for id in self.walk(head)? {
            let record = self.record(&id)?;
            linear &= !record.is_merge();
            if linear && filter.after.is_some_and(|after| record.timestamp < after) {
                break;
            }
            if filter.matches(&record) {
                found.push(record);
                if filter.is_full(found.len()) {
                    break;
                }
            }
            if filter.last_id == Some(id) {
                break;
            }
        }
        link(&mut found);
        debug!(head = %head.short_hex(), matches = found.len(), "search walk");
        Ok(found)
    }

    /// Decode one commit into a record without linearization.
    pub fn record(&self, id: &ObjectId) -> HistoryResult<CommitRecord> {
        let commit = self.store.read_commit(id)?;
        let message = CommitMessage::parse(&commit.message).map_err(|e| {
            HistoryError::CorruptMessage {
                id: *id,
                reason: e.to_string(),
            }
        })?;
        let author_uri = self.author_uri(&commit)?;
        Ok(CommitRecord {
            id: *id,
            parents: commit.parents,
            linearized_parent: None,
            author_device: commit.author.device,
            author_uri,
            timestamp: commit.timestamp,
            message,
        })
    }

    /// Owner of the commit's device: looked up in the commit tree, then in
    /// the first parent's tree for commits where the author left.
    pub fn author_uri(&self, commit: &CommitObject) -> HistoryResult<Option<String>> {
        let device = &commit.author.device;
        if let Some(uri) = self.cache.cached(device) {
            return Ok(Some(uri));
        }
        let tree = Snapshot::load(self.store, &commit.tree)?;
        if let Some(uri) = self.cache.owner(self.store, &tree, device)? {
            return Ok(Some(uri));
        }
        let Some(parent) = commit.parents.first() else {
            return Ok(None);
        };
        let parent = self.store.read_commit(parent)?;
        let tree = Snapshot::load(self.store, &parent.tree)?;
        Ok(self.cache.owner(self.store, &tree, device)?)
    }

    fn walk(&self, from: &ObjectId) -> HistoryResult<Vec<ObjectId>> {
        let graph = CommitGraph::load(self.store, &[*from])?;
        Ok(graph.reverse_topological(from, &[])?)
    }
}

/// Point every record at the one shown after it.
fn link(records: &mut [CommitRecord]) {
    let next: Vec<Option<ObjectId>> = records.iter().skip(1).map(|r| Some(r.id)).collect();
    for (record, next) in records.iter_mut().zip(next.into_iter().chain([None])) {
        record.linearized_parent = next;
    }
}
