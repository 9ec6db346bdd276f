//! What the root commit fixes for the lifetime of a conversation.

use tracing::debug;

use convlog_membership::device_certificate;
use convlog_store::{ObjectStore, ObjectStoreExt, Snapshot};
use convlog_types::{ConversationMode, ObjectId};

use crate::error::ValidatorError;
use crate::message::{CommitKind, CommitMessage};

/// Mode and initial participants read from the root commit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootInfo {
    /// Id of the root commit, which is also the conversation id.
    pub id: ObjectId,
    pub mode: ConversationMode,
    pub invited: Option<String>,
    /// The creator, followed by the invited peer in one-to-one mode.
    pub initial_members: Vec<String>,
}

impl RootInfo {
    /// Decode the root commit `id`.
    pub fn load(store: &dyn ObjectStore, id: &ObjectId) -> Result<Self, ValidatorError> {
        let commit = store.read_commit(id)?;
        if !commit.parents.is_empty() {
            return Err(ValidatorError::NotRoot(*id));
        }
        let msg = CommitMessage::parse(&commit.message)?;
        let CommitKind::Initial { mode, invited } = CommitKind::classify(0, &msg)? else {
            return Err(ValidatorError::NotRoot(*id));
        };

        let tree = Snapshot::load(store, &commit.tree)?;
        let creator = device_certificate(store, &tree, &commit.author.device)?
            .map(|cert| cert.issuer_uid())
            .filter(|uri| !uri.is_empty())
            .ok_or(ValidatorError::UnknownAuthor(*id))?;

        let mut initial_members = vec![creator];
        if mode == ConversationMode::OneToOne {
            if let Some(peer) = invited.as_ref().filter(|peer| **peer != initial_members[0]) {
                initial_members.push(peer.clone());
            }
        }
        debug!(conversation = %id.short_hex(), %mode, "loaded root commit");
        Ok(Self {
            id: *id,
            mode,
            invited,
            initial_members,
        })
    }

    /// Walk first parents from `tip` down to the root and decode it.
    pub fn find(store: &dyn ObjectStore, tip: &ObjectId) -> Result<Self, ValidatorError> {
        Self::load(store, &find_root(store, tip)?)
    }

    pub fn creator(&self) -> &str {
        &self.initial_members[0]
    }
}

/// Id of the root reached by following first parents from `tip`.
pub fn find_root(store: &dyn ObjectStore, tip: &ObjectId) -> Result<ObjectId, ValidatorError> {
    let mut current = *tip;
    loop {
        let commit = store.read_commit(&current)?;
        match commit.parents.first() {
            Some(parent) => current = *parent,
            None => return Ok(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Peer, Timeline};

    #[test]
    fn one_to_one_root_lists_both_participants() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let timeline = Timeline::one_to_one(&alice, &bob.uri());

        let root = RootInfo::load(&timeline.store, &timeline.root).unwrap();
        assert_eq!(root.mode, ConversationMode::OneToOne);
        assert_eq!(root.initial_members, vec![alice.uri(), bob.uri()]);
        assert_eq!(root.creator(), alice.uri());
    }

    #[test]
    fn group_root_lists_only_creator() {
        let alice = Peer::new("alice");
        let timeline = Timeline::group(&alice, ConversationMode::InvitesOnly);
        let root = RootInfo::load(&timeline.store, &timeline.root).unwrap();
        assert_eq!(root.initial_members, vec![alice.uri()]);
        assert_eq!(root.invited, None);
    }

    #[test]
    fn find_walks_to_the_root() {
        let alice = Peer::new("alice");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        timeline.text(&alice, "hello");
        let tip = timeline.text(&alice, "again");
        assert_eq!(find_root(&timeline.store, &tip).unwrap(), timeline.root);
        assert_eq!(RootInfo::find(&timeline.store, &tip).unwrap().id, timeline.root);
    }

    #[test]
    fn non_root_is_refused() {
        let alice = Peer::new("alice");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let tip = timeline.text(&alice, "hello");
        let err = RootInfo::load(&timeline.store, &tip).unwrap_err();
        assert!(matches!(err, ValidatorError::NotRoot(id) if id == tip));
    }
}
