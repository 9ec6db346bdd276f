//! Signed conversation fixtures for the rule tests.

use convlog_crypto::{Certificate, SigningKey};
use convlog_membership::{apply_resolution, paths, TargetKind, VoteDirection, VotePath};
use convlog_store::{Author, CommitObject, InMemoryObjectStore, ObjectStoreExt, Snapshot};
use convlog_types::{ConversationMode, ObjectId};

use crate::message::{CommitKind, CommitMessage, MemberAction};

pub const FAR: i64 = 4_000_000_000;

/// An account with one device.
pub struct Peer {
    pub name: String,
    pub account: SigningKey,
    pub device: SigningKey,
    pub not_after: i64,
}

impl Peer {
    pub fn new(name: &str) -> Self {
        Self::expiring(name, FAR)
    }

    pub fn expiring(name: &str, not_after: i64) -> Self {
        Self {
            name: name.to_string(),
            account: SigningKey::generate(),
            device: SigningKey::generate(),
            not_after,
        }
    }

    pub fn uri(&self) -> String {
        self.account.fingerprint()
    }

    pub fn device_id(&self) -> String {
        self.device.fingerprint()
    }

    pub fn account_cert(&self) -> Vec<u8> {
        Certificate::issue_self(&self.account, &self.name, self.not_after).to_bytes()
    }

    pub fn device_cert(&self) -> Vec<u8> {
        Certificate::issue(
            &self.device.verifying_key(),
            &self.account,
            format!("{}'s device", self.name),
            self.not_after,
        )
        .to_bytes()
    }

    fn author(&self) -> Author {
        Author {
            name: self.name.clone(),
            device: self.device_id(),
        }
    }
}

/// A linear history built commit by commit.
pub struct Timeline {
    pub store: InMemoryObjectStore,
    pub root: ObjectId,
    pub head: ObjectId,
    pub commits: Vec<ObjectId>,
    clock: i64,
}

impl Timeline {
    pub fn create(creator: &Peer, mode: ConversationMode, invited: Option<&str>) -> Self {
        let store = InMemoryObjectStore::new();
        let mut snap = Snapshot::new();
        let uri = creator.uri();
        snap.put_file(&store, paths::admin_cert(&uri), &creator.account_cert())
            .unwrap();
        snap.put_file(&store, paths::device_cert(&creator.device_id()), &creator.device_cert())
            .unwrap();
        snap.put_file(&store, paths::crl(&uri), b"").unwrap();
        if let Some(peer) = invited {
            snap.put_file(&store, paths::invited(peer), b"").unwrap();
        }
        let msg = CommitKind::Initial {
            mode,
            invited: invited.map(str::to_string),
        }
        .to_message();
        let root = sign(&store, creator, &snap, &msg, vec![], 1_000);
        Self {
            store,
            root,
            head: root,
            commits: vec![root],
            clock: 1_000,
        }
    }

    pub fn one_to_one(creator: &Peer, invited: &str) -> Self {
        Self::create(creator, ConversationMode::OneToOne, Some(invited))
    }

    pub fn group(creator: &Peer, mode: ConversationMode) -> Self {
        Self::create(creator, mode, None)
    }

    pub fn snapshot(&self) -> Snapshot {
        let commit = self.store.read_commit(&self.head).unwrap();
        Snapshot::load(&self.store, &commit.tree).unwrap()
    }

    /// Commit `snap` on top of the head and advance it.
    pub fn commit(&mut self, author: &Peer, snap: &Snapshot, msg: &CommitMessage) -> ObjectId {
        self.clock += 10;
        let id = sign(&self.store, author, snap, msg, vec![self.head], self.clock);
        self.head = id;
        self.commits.push(id);
        id
    }

    /// Snapshot of the head with the author's device announced.
    pub fn announced(&self, author: &Peer) -> Snapshot {
        let mut snap = self.snapshot();
        let path = paths::device_cert(&author.device_id());
        if !snap.contains(&path) {
            snap.put_file(&self.store, path, &author.device_cert()).unwrap();
        }
        snap
    }

    pub fn text(&mut self, author: &Peer, body: &str) -> ObjectId {
        let snap = self.announced(author);
        self.commit(author, &snap, &CommitMessage::text(body))
    }

    pub fn member(&self, action: MemberAction, uri: &str) -> CommitMessage {
        CommitKind::Member {
            action,
            uri: uri.to_string(),
        }
        .to_message()
    }

    pub fn add(&mut self, author: &Peer, target: &str) -> ObjectId {
        let mut snap = self.announced(author);
        snap.put_file(&self.store, paths::invited(target), b"").unwrap();
        let msg = self.member(MemberAction::Add, target);
        self.commit(author, &snap, &msg)
    }

    pub fn join(&mut self, peer: &Peer) -> ObjectId {
        let uri = peer.uri();
        let mut snap = self.announced(peer);
        snap.remove(&paths::invited(&uri));
        snap.put_file(&self.store, paths::member_cert(&uri), &peer.account_cert())
            .unwrap();
        let msg = self.member(MemberAction::Join, &uri);
        self.commit(peer, &snap, &msg)
    }

    pub fn vote(
        &mut self,
        author: &Peer,
        direction: VoteDirection,
        kind: TargetKind,
        target: &str,
    ) -> ObjectId {
        let mut snap = self.announced(author);
        let marker = VotePath::new(direction, kind, target, author.uri());
        snap.put_file(&self.store, marker.to_path(), b"").unwrap();
        let msg = CommitKind::Vote {
            uri: target.to_string(),
        }
        .to_message();
        self.commit(author, &snap, &msg)
    }

    pub fn resolve(
        &mut self,
        author: &Peer,
        direction: VoteDirection,
        kind: TargetKind,
        target: &str,
    ) -> ObjectId {
        let mut snap = self.snapshot();
        apply_resolution(&self.store, &mut snap, direction, kind, target).unwrap();
        let action = match direction {
            VoteDirection::Ban => MemberAction::Ban,
            VoteDirection::Unban => MemberAction::Unban,
        };
        let msg = self.member(action, target);
        self.commit(author, &snap, &msg)
    }
}

pub fn sign(
    store: &InMemoryObjectStore,
    author: &Peer,
    snap: &Snapshot,
    msg: &CommitMessage,
    parents: Vec<ObjectId>,
    timestamp: i64,
) -> ObjectId {
    let tree = snap.write(store).unwrap();
    let commit = CommitObject::build(
        tree,
        parents,
        author.author(),
        timestamp,
        msg.to_json(),
        |payload| author.device.sign(payload),
    )
    .unwrap();
    store.write_commit(&commit).unwrap()
}
