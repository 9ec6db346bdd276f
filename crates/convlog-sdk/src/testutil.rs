use std::sync::Arc;

use convlog_dag::CommitGraph;
use convlog_pack::{missing_objects, PackWriter};
use convlog_sync::FetchedPack;
use convlog_types::ObjectId;

use crate::account::LocalAccount;
use crate::conversation::Conversation;

pub fn account(name: &str) -> Arc<LocalAccount> {
    Arc::new(LocalAccount::generate(name))
}

/// Every commit reachable from the head, oldest first.
pub fn all_commits(conv: &Conversation) -> Vec<ObjectId> {
    let head = conv.head().unwrap();
    CommitGraph::load(conv.store(), &[head])
        .unwrap()
        .commits_between(&head, &[])
        .unwrap()
}

/// What a fetch of `from`'s head would deliver to a peer holding `haves`.
pub fn pack_between(from: &Conversation, haves: &[ObjectId]) -> FetchedPack {
    pack_for(from, from.head().unwrap(), haves)
}

pub fn pack_for(from: &Conversation, want: ObjectId, haves: &[ObjectId]) -> FetchedPack {
    let known: Vec<ObjectId> = haves
        .iter()
        .copied()
        .filter(|id| from.store().exists(id).unwrap())
        .collect();
    let ids = missing_objects(from.store(), &[want], &known).unwrap();
    let mut writer = PackWriter::new();
    writer.add_from_store(from.store(), &ids).unwrap();
    FetchedPack {
        head: want,
        want,
        common: known.first().copied(),
        refs: Vec::new(),
        pack: writer.finish().unwrap(),
    }
}
