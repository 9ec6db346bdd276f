//! Exchanging history with peer devices.
//!
//! Network I/O and validation are kept apart: [`Conversation::fetch_from`]
//! only moves bytes, [`Conversation::valid_fetch`] judges a received pack
//! without touching the network, and [`Conversation::merge`] joins an
//! accepted tip into the head.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use convlog_dag::CommitGraph;
use convlog_membership::DeviceOwnerCache;
use convlog_merge::{MergeEngine, MergeOutcome};
use convlog_pack::PackReader;
use convlog_refs::{remote_ref_name, InMemoryRefStore, Ref, RefStore, MAIN_BRANCH};
use convlog_store::{InMemoryObjectStore, ObjectStore, StagedObjectStore};
use convlog_sync::{
    fetch, serve, Channel, FetchOptions, FetchedPack, Incoming, PeerNetwork, SyncResult,
};
use convlog_types::ObjectId;
use convlog_validator::root::find_root;
use convlog_validator::{CommitKind, CommitValidator, RootInfo};

use crate::account::Account;
use crate::config::ConversationConfig;
use crate::conversation::{main_ref, sign_commit, Conversation};
use crate::error::{ConversationError, ConversationResult};

/// How a merge changed the head.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStatus {
    /// Nothing to do; no commit was created.
    UpToDate,
    FastForward(ObjectId),
    /// A merge commit was created.
    Merged(ObjectId),
}

impl MergeStatus {
    /// The new head, if the merge moved it.
    pub fn new_head(&self) -> Option<ObjectId> {
        match self {
            Self::UpToDate => None,
            Self::FastForward(id) | Self::Merged(id) => Some(*id),
        }
    }
}

/// A fetched batch accepted into the local store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchReport {
    pub device: String,
    /// Tip recorded under the device's remote ref.
    pub tip: ObjectId,
    /// Newly learned commits, oldest first.
    pub commits: Vec<ObjectId>,
}

impl Conversation {
    /// Commits this device already has: the head and every remote tip.
    pub fn haves(&self) -> ConversationResult<Vec<ObjectId>> {
        let mut haves = vec![self.head()?];
        for (_, reference) in self.refs.list_refs("refs/remotes/")? {
            let target = reference.target();
            if !haves.contains(&target) {
                haves.push(target);
            }
        }
        Ok(haves)
    }

    /// Fetch the head of `device`. Nothing is stored; failures are signalled.
    pub async fn fetch_from(
        &self,
        network: &dyn PeerNetwork,
        device: &str,
    ) -> ConversationResult<FetchedPack> {
        let conversation = self.id.to_hex();
        let haves = self.haves()?;
        fetch_over(network, device, &conversation, &haves, &self.config.fetch_options())
            .await
            .map_err(|e| self.report(e.into()))
    }

    /// Validate a fetched pack and keep it only if every new commit passes.
    ///
    /// Commits are judged oldest first against a staging overlay; the first
    /// rejection discards the whole batch and leaves the store, the refs and
    /// the device cache untouched. On success the tip is recorded as
    /// `refs/remotes/<device>/main`. The head never moves here.
    pub fn valid_fetch(
        &self,
        device: &str,
        fetched: &FetchedPack,
    ) -> ConversationResult<FetchReport> {
        self.accept_fetch(device, fetched)
            .map_err(|e| self.report(e))
    }

    fn accept_fetch(&self, device: &str, fetched: &FetchedPack) -> ConversationResult<FetchReport> {
        let tip = fetched.want;
        let staged = StagedObjectStore::new(&*self.store);
        PackReader::new(&fetched.pack)?
            .with_limit(self.config.max_fetch_size as u64)
            .unpack_into(&staged)?;

        let root = find_root(&staged, &tip)?;
        if root != self.id {
            return Err(ConversationError::WrongConversation {
                expected: self.id,
                got: root,
            });
        }

        let haves = self.haves()?;
        let mut tips = vec![tip];
        tips.extend_from_slice(&haves);
        let graph = CommitGraph::load(&staged, &tips)?;
        let mut commits = Vec::new();
        for id in graph.commits_between(&tip, &haves)? {
            if !self.store.exists(&id)? {
                commits.push(id);
            }
        }

        let scratch = DeviceOwnerCache::new();
        let config = self.config.validator();
        CommitValidator::new(&staged, &scratch, &config)
            .with_root(self.root.clone())
            .validate_batch(&commits)?;

        let applied = staged.apply()?;
        self.cache.absorb(&scratch);
        self.refs.write_ref(
            &remote_ref_name(device, MAIN_BRANCH),
            &Ref::remote(device, MAIN_BRANCH, tip),
        )?;
        info!(
            conversation = %self.id.short_hex(),
            %device,
            tip = %tip.short_hex(),
            commits = commits.len(),
            objects = applied,
            "accepted fetched history"
        );
        Ok(FetchReport {
            device: device.to_string(),
            tip,
            commits,
        })
    }

    /// Join `theirs` into the head.
    ///
    /// Divergent histories get a merge commit with parents `[head, theirs]`.
    /// Conflicts outside `profile.vcf` fail the merge and are signalled.
    pub fn merge(&self, theirs: &ObjectId) -> ConversationResult<MergeStatus> {
        self.merge_into_head(theirs).map_err(|e| self.report(e))
    }

    fn merge_into_head(&self, theirs: &ObjectId) -> ConversationResult<MergeStatus> {
        let head = self.head()?;
        match MergeEngine::new(&*self.store).merge(Some(&head), theirs)? {
            MergeOutcome::UpToDate => {
                debug!(conversation = %self.id.short_hex(), commit = %theirs.short_hex(), "already merged");
                Ok(MergeStatus::UpToDate)
            }
            MergeOutcome::FastForward(id) => {
                self.advance_head(head, id)?;
                Ok(MergeStatus::FastForward(id))
            }
            MergeOutcome::Merged { tree, resolved, .. } => {
                let msg = CommitKind::Merge.to_message();
                let id = sign_commit(&*self.account, &*self.store, tree, vec![head, *theirs], &msg)?;
                self.advance_head(head, id)?;
                info!(
                    conversation = %self.id.short_hex(),
                    commit = %id.short_hex(),
                    resolved = resolved.len(),
                    "merged"
                );
                Ok(MergeStatus::Merged(id))
            }
        }
    }

    /// Fetch from `device`, validate and merge.
    pub async fn fetch_and_merge(
        &self,
        network: &dyn PeerNetwork,
        device: &str,
    ) -> ConversationResult<MergeStatus> {
        let fetched = self.fetch_from(network, device).await?;
        let report = self.valid_fetch(device, &fetched)?;
        self.merge(&report.tip)
    }

    /// Last validated tip of `device`.
    pub fn remote_head(&self, device: &str) -> ConversationResult<Option<ObjectId>> {
        Ok(self
            .refs
            .read_ref(&remote_ref_name(device, MAIN_BRANCH))?
            .map(|r| r.target()))
    }

    /// Forget the remote ref of `device`. Returns `false` if there was none.
    pub fn remove_branch_with(&self, device: &str) -> ConversationResult<bool> {
        let removed = self.refs.delete_ref(&remote_ref_name(device, MAIN_BRANCH))?;
        if removed {
            debug!(conversation = %self.id.short_hex(), %device, "removed remote ref");
        }
        Ok(removed)
    }

    /// Answer fetches on `channel` until the peer closes it.
    pub async fn serve(&self, channel: &mut dyn Channel) -> ConversationResult<Vec<ObjectId>> {
        Ok(serve(
            channel,
            &self.id.to_hex(),
            &*self.store,
            &*self.refs,
            &self.config.serve_options(),
        )
        .await?)
    }

    /// Serve every channel arriving on `incoming`, one task per channel.
    pub fn listen(self: Arc<Self>, mut incoming: mpsc::UnboundedReceiver<Incoming>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(Incoming { conversation, mut channel }) = incoming.recv().await {
                let conv = Arc::clone(&self);
                tokio::spawn(async move {
                    let peer = channel.peer().to_string();
                    match conv.serve(&mut channel).await {
                        Ok(served) => debug!(%conversation, %peer, packs = served.len(), "channel done"),
                        Err(e) => debug!(%conversation, %peer, error = %e, "channel failed"),
                    }
                });
            }
        })
    }

    /// Build a conversation from a pack holding its whole history.
    ///
    /// Every commit is validated from the root; the fresh stores are dropped
    /// on the first rejection.
    pub fn from_pack(
        account: Arc<dyn Account>,
        device: &str,
        conversation: &ObjectId,
        fetched: &FetchedPack,
        config: ConversationConfig,
    ) -> ConversationResult<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let refs: Arc<dyn RefStore> = Arc::new(InMemoryRefStore::new());
        let tip = fetched.want;
        PackReader::new(&fetched.pack)?
            .with_limit(config.max_fetch_size as u64)
            .unpack_into(&*store)?;

        let root = find_root(&*store, &tip)?;
        if root != *conversation {
            return Err(ConversationError::WrongConversation {
                expected: *conversation,
                got: root,
            });
        }
        let info = RootInfo::load(&*store, &root)?;
        let commits = CommitGraph::load(&*store, &[tip])?.commits_between(&tip, &[])?;
        let cache = DeviceOwnerCache::new();
        let validator_config = config.validator();
        CommitValidator::new(&*store, &cache, &validator_config)
            .with_root(info.clone())
            .validate_batch(&commits)?;

        refs.write_ref(&main_ref(), &Ref::branch(MAIN_BRANCH, tip))?;
        refs.write_ref(
            &remote_ref_name(device, MAIN_BRANCH),
            &Ref::remote(device, MAIN_BRANCH, tip),
        )?;
        info!(
            conversation = %root.short_hex(),
            %device,
            commits = commits.len(),
            "cloned conversation"
        );
        let conv = Self::assemble(account, store, refs, info, config);
        conv.cache.absorb(&cache);
        Ok(conv)
    }

    /// Clone `conversation` from `device`.
    pub async fn clone_from_peer(
        account: Arc<dyn Account>,
        network: &dyn PeerNetwork,
        device: &str,
        conversation: &ObjectId,
        config: ConversationConfig,
    ) -> ConversationResult<Self> {
        let fetched = fetch_over(
            network,
            device,
            &conversation.to_hex(),
            &[],
            &config.fetch_options(),
        )
        .await?;
        Self::from_pack(account, device, conversation, &fetched, config)
    }
}

async fn fetch_over(
    network: &dyn PeerNetwork,
    device: &str,
    conversation: &str,
    haves: &[ObjectId],
    options: &FetchOptions,
) -> SyncResult<FetchedPack> {
    let mut channel = network.open(device, conversation).await?;
    fetch(&mut *channel, conversation, haves, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use convlog_crypto::Signature;
    use convlog_membership::TargetKind;
    use convlog_store::{ObjectStoreExt, Snapshot};
    use convlog_sync::MemoryNetwork;
    use convlog_types::{ConversationMode, ErrorKind, Member, MemberRole};
    use convlog_validator::CommitMessage;
    use proptest::prelude::*;

    use crate::account::LocalAccount;
    use crate::event::{ConversationEvent, EventKind};
    use crate::profile;
    use crate::testutil::{account, all_commits, pack_between, pack_for};

    fn clone_of(origin: &Conversation, who: Arc<LocalAccount>) -> Conversation {
        Conversation::from_pack(
            who,
            &origin.account().device_id(),
            &origin.id(),
            &pack_between(origin, &[]),
            origin.config().clone(),
        )
        .unwrap()
    }

    /// Alice's group with Bob joined on his own device and stores.
    fn group_pair(config: ConversationConfig) -> (Conversation, Conversation) {
        let alice = Conversation::create(account("alice"), ConversationMode::InvitesOnly, None, config)
            .unwrap();
        let bob_account = account("bob");
        alice.add_member(&bob_account.uri()).unwrap();
        let bob = clone_of(&alice, bob_account);
        bob.join().unwrap();
        pull(&alice, &bob);
        (alice, bob)
    }

    /// `to` fetches and validates `from`'s head without merging it.
    fn fetch_only(to: &Conversation, from: &Conversation) -> ObjectId {
        let device = from.account().device_id();
        let fetched = pack_between(from, &to.haves().unwrap());
        to.valid_fetch(&device, &fetched).unwrap().tip
    }

    fn pull(to: &Conversation, from: &Conversation) -> MergeStatus {
        let tip = fetch_only(to, from);
        to.merge(&tip).unwrap()
    }

    #[test]
    fn fetched_history_is_validated_then_merged() {
        let (alice, bob) = group_pair(ConversationConfig::default());
        assert_eq!(alice.role_of(&bob.account().uri()).unwrap(), Some(MemberRole::Member));
        assert_eq!(alice.head().unwrap(), bob.head().unwrap());
        assert_eq!(
            alice.remote_head(&bob.account().device_id()).unwrap(),
            Some(bob.head().unwrap())
        );

        bob.send_text("hello").unwrap();
        let device = bob.account().device_id();
        let fetched = pack_between(&bob, &alice.haves().unwrap());
        let report = alice.valid_fetch(&device, &fetched).unwrap();
        assert_eq!(report.commits, vec![bob.head().unwrap()]);
        // Accepted but not merged yet.
        assert_ne!(alice.head().unwrap(), report.tip);
        assert_eq!(alice.merge(&report.tip).unwrap(), MergeStatus::FastForward(report.tip));
        assert_eq!(alice.uri_from_device(&device).unwrap(), Some(bob.account().uri()));

        assert!(alice.remove_branch_with(&device).unwrap());
        assert!(!alice.remove_branch_with(&device).unwrap());
        assert_eq!(alice.remote_head(&device).unwrap(), None);
    }

    #[test]
    fn flipped_signature_is_rejected() {
        let (alice, bob) = group_pair(ConversationConfig::default());
        let mut errors = alice.events().subscribe_to(&[EventKind::Error]);
        bob.send_text("hello").unwrap();

        let mut commit = bob.store().read_commit(&bob.head().unwrap()).unwrap();
        let mut bytes = commit.signature.to_bytes();
        bytes[7] ^= 0x01;
        commit.signature = Signature::from_bytes(&bytes);
        let forged = bob.store().write_commit(&commit).unwrap();

        let head = alice.head().unwrap();
        let objects = alice.store().all_ids().unwrap().len();
        let fetched = pack_for(&bob, forged, &alice.haves().unwrap());
        let err = alice
            .valid_fetch(&bob.account().device_id(), &fetched)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSignature);
        assert!(!err.is_retryable());
        assert_eq!(alice.head().unwrap(), head);
        assert_eq!(alice.store().all_ids().unwrap().len(), objects);
        assert_eq!(alice.remote_head(&bob.account().device_id()).unwrap(), Some(head));

        match errors.try_recv().unwrap() {
            ConversationEvent::Error { conversation, kind, .. } => {
                assert_eq!(conversation, alice.id().to_hex());
                assert_eq!(kind, ErrorKind::BadSignature);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn extra_file_is_rejected() {
        let (alice, bob) = group_pair(ConversationConfig::default());
        bob.send_text("first").unwrap();
        let (head, mut snap) = bob.head_snapshot().unwrap();
        snap.put_file(bob.store(), "notes.txt", b"sneaky").unwrap();
        bob.commit(head, &snap, &CommitMessage::text("second")).unwrap();

        let before = alice.head().unwrap();
        let fetched = pack_between(&bob, &alice.haves().unwrap());
        let err = alice
            .valid_fetch(&bob.account().device_id(), &fetched)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedGenericCommit);
        assert_eq!(alice.head().unwrap(), before);
        // All or nothing: the valid first commit was discarded too.
        let first = all_commits(&bob)[all_commits(&bob).len() - 2];
        assert!(!alice.store().exists(&first).unwrap());
    }

    #[test]
    fn foreign_history_is_rejected() {
        let alice = Conversation::create(account("alice"), ConversationMode::Public, None, Default::default())
            .unwrap();
        let other = Conversation::create(account("carol"), ConversationMode::Public, None, Default::default())
            .unwrap();
        let err = alice
            .valid_fetch("carol-device", &pack_between(&other, &[]))
            .unwrap_err();
        assert!(matches!(err, ConversationError::WrongConversation { .. }));
        assert_eq!(err.kind(), ErrorKind::MalformedInitialCommit);

        let err = Conversation::from_pack(
            account("dave"),
            "carol-device",
            &alice.id(),
            &pack_between(&other, &[]),
            Default::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConversationError::WrongConversation { .. }));
    }

    #[test]
    fn inflated_pack_is_refused() {
        let alice = Conversation::create(account("alice"), ConversationMode::Public, None, Default::default())
            .unwrap();
        alice.send_text(&"z".repeat(64 * 1024)).unwrap();
        let fetched = pack_between(&alice, &[]);
        assert!(fetched.pack.len() < 16 * 1024);

        let err = Conversation::from_pack(
            account("bob"),
            &alice.account().device_id(),
            &alice.id(),
            &fetched,
            ConversationConfig {
                max_fetch_size: 32 * 1024,
                ..Default::default()
            },
        )
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::FetchTooLarge);
        assert!(err.is_retryable());
    }

    #[test]
    fn merging_an_ancestor_is_a_no_op() {
        let alice = Conversation::create(account("alice"), ConversationMode::Public, None, Default::default())
            .unwrap();
        let first = alice.send_text("one").unwrap();
        let second = alice.send_text("two").unwrap();
        let commits = all_commits(&alice).len();

        assert_eq!(alice.merge(&first).unwrap(), MergeStatus::UpToDate);
        assert_eq!(alice.merge(&second).unwrap(), MergeStatus::UpToDate);
        assert_eq!(alice.head().unwrap(), second);
        assert_eq!(all_commits(&alice).len(), commits);
    }

    #[test]
    fn diverged_messages_merge() {
        let (alice, bob) = group_pair(ConversationConfig::default());
        alice.send_text("from alice").unwrap();
        bob.send_text("from bob").unwrap();

        let status = pull(&alice, &bob);
        let MergeStatus::Merged(merge) = status else {
            panic!("expected a merge commit, got {status:?}");
        };
        let commit = alice.store().read_commit(&merge).unwrap();
        assert_eq!(commit.parents.len(), 2);
        assert_eq!(CommitMessage::parse(&commit.message).unwrap().message_type(), Some("merge"));

        // The merge itself travels back and validates.
        assert_eq!(pull(&bob, &alice), MergeStatus::FastForward(merge));
        assert_eq!(pull(&alice, &bob), MergeStatus::UpToDate);
    }

    fn profile_race(alice_title: &str, bob_title: &str) -> (String, String, String) {
        let config = ConversationConfig {
            update_profile_perm_lvl: MemberRole::Member,
            ..Default::default()
        };
        let (alice, bob) = group_pair(config);
        let a = alice
            .update_infos(&BTreeMap::from([(profile::TITLE.to_string(), alice_title.to_string())]))
            .unwrap();
        let b = bob
            .update_infos(&BTreeMap::from([(profile::TITLE.to_string(), bob_title.to_string())]))
            .unwrap();
        let expected = if a > b { alice_title } else { bob_title };

        // Both peers learn the other side first, then merge independently.
        let theirs_for_alice = fetch_only(&alice, &bob);
        let theirs_for_bob = fetch_only(&bob, &alice);
        assert_eq!((theirs_for_alice, theirs_for_bob), (b, a));
        assert!(matches!(alice.merge(&b).unwrap(), MergeStatus::Merged(_)));
        assert!(matches!(bob.merge(&a).unwrap(), MergeStatus::Merged(_)));
        (
            expected.to_string(),
            alice.infos().unwrap()[profile::TITLE].clone(),
            bob.infos().unwrap()[profile::TITLE].clone(),
        )
    }

    #[test]
    fn profile_conflict_prefers_the_greater_commit() {
        let (expected, on_alice, on_bob) = profile_race("Alice's room", "Bob's room");
        assert_eq!(on_alice, expected);
        assert_eq!(on_bob, expected);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn profile_merge_converges(a in "[a-z]{1,12}", b in "[A-Z]{1,12}") {
            let (expected, on_alice, on_bob) = profile_race(&a, &b);
            prop_assert_eq!(&on_alice, &expected);
            prop_assert_eq!(&on_bob, &expected);
        }
    }

    #[test]
    fn conflicts_outside_the_profile_fail() {
        let (alice, bob) = group_pair(ConversationConfig::default());
        for (conv, data) in [(&alice, b"a".as_slice()), (&bob, b"b".as_slice())] {
            let (head, mut snap): (ObjectId, Snapshot) = conv.head_snapshot().unwrap();
            snap.put_file(conv.store(), "shared.txt", data).unwrap();
            conv.commit(head, &snap, &CommitMessage::text("clash")).unwrap();
        }
        // Bypass validation: only the merge policy is under test.
        let theirs = bob.head().unwrap();
        let fetched = pack_between(&bob, &alice.haves().unwrap());
        PackReader::new(&fetched.pack).unwrap().unpack_into(alice.store()).unwrap();

        let head = alice.head().unwrap();
        let err = alice.merge(&theirs).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MergeConflict);
        assert_eq!(alice.head().unwrap(), head);
    }

    #[tokio::test]
    async fn fetch_size_cap_is_retryable() {
        let network = MemoryNetwork::new(64);
        let alice = Arc::new(
            Conversation::create(account("alice"), ConversationMode::Public, None, Default::default())
                .unwrap(),
        );
        let alice_device = alice.account().device_id();
        let _server = Arc::clone(&alice).listen(network.listen(alice_device.clone()));
        alice.send_text(&"x".repeat(4096)).unwrap();

        let err = Conversation::clone_from_peer(
            account("bob"),
            &network.as_device("bob-device"),
            &alice_device,
            &alice.id(),
            ConversationConfig {
                max_fetch_size: 64,
                ..Default::default()
            },
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.kind(), ErrorKind::FetchTooLarge);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn one_to_one_scenario_over_the_network() {
        let network = MemoryNetwork::new(64);
        let a = account("alice");
        let b = account("bob");

        let alice = Arc::new(
            Conversation::create(a.clone(), ConversationMode::OneToOne, Some(&b.uri()), Default::default())
                .unwrap(),
        );
        assert_eq!(alice.initial_members(), [a.uri(), b.uri()]);
        let _alice_server = Arc::clone(&alice).listen(network.listen(a.device_id()));

        let bob = Arc::new(
            Conversation::clone_from_peer(
                b.clone(),
                &network.as_device(b.device_id()),
                &a.device_id(),
                &alice.id(),
                Default::default(),
            )
            .await
            .unwrap(),
        );
        assert_eq!(bob.id(), alice.id());
        assert_eq!(bob.initial_members(), [a.uri(), b.uri()]);
        assert_eq!(bob.role_of(&b.uri()).unwrap(), Some(MemberRole::Invited));
        let _bob_server = Arc::clone(&bob).listen(network.listen(b.device_id()));

        bob.join().unwrap();
        let status = alice
            .fetch_and_merge(&network.as_device(a.device_id()), &b.device_id())
            .await
            .unwrap();
        assert_eq!(status, MergeStatus::FastForward(bob.head().unwrap()));
        assert_eq!(
            alice.members().unwrap(),
            vec![
                Member::new(a.uri(), MemberRole::Admin),
                Member::new(b.uri(), MemberRole::Member),
            ]
        );
        assert!(alice.devices(false).unwrap().contains_key(&b.device_id()));

        let outcome = alice.vote_kick(&b.uri(), TargetKind::Members).unwrap();
        let resolution = outcome.resolution.unwrap();
        let record = &alice.log(&convlog_history::LogOptions::new().max_count(1)).unwrap()[0];
        assert_eq!(record.id, resolution);
        assert_eq!(record.message.get_str("type"), Some("member"));
        assert_eq!(record.message.get_str("action"), Some("ban"));
        assert_eq!(
            alice.members().unwrap(),
            vec![
                Member::new(a.uri(), MemberRole::Admin),
                Member::new(b.uri(), MemberRole::Banned),
            ]
        );
        assert!(!alice.devices(false).unwrap().contains_key(&b.device_id()));

        // Bob learns about the ban by fetching from Alice.
        let status = bob
            .fetch_and_merge(&network.as_device(b.device_id()), &a.device_id())
            .await
            .unwrap();
        assert_eq!(status, MergeStatus::FastForward(resolution));
        assert_eq!(bob.role_of(&b.uri()).unwrap(), Some(MemberRole::Banned));
    }

    #[tokio::test]
    async fn unreachable_peer_is_signalled() {
        let network = MemoryNetwork::new(8);
        let alice = Conversation::create(account("alice"), ConversationMode::Public, None, Default::default())
            .unwrap();
        let mut errors = alice.subscribe();
        let err = alice.fetch_from(&network, "nobody").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FetchNetworkFailure);
        assert!(err.is_retryable());
        assert_eq!(errors.recv().await.unwrap().kind(), EventKind::Error);
    }
}
