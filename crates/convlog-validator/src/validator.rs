//! The rule engine entry point.

use tracing::{debug, warn};

use convlog_membership::{DeviceOwnerCache, VoteDirection};
use convlog_store::{ObjectStore, ObjectStoreExt};
use convlog_types::{ErrorKind, ObjectId};

use crate::config::ValidatorConfig;
use crate::error::{MessageError, Rejection};
use crate::message::{
    CommitKind, CommitMessage, MemberAction, TYPE_EDITED_MESSAGE, TYPE_MEMBER, TYPE_VOTE,
};
use crate::root::RootInfo;
use crate::rules::{self, CommitContext, RuleResult, Side};

/// Validates commits of one conversation against its own history.
///
/// The validator only reads the store. Commits must be judged parents
/// first: a rule reads the tree at the first parent, which has to be in
/// the store already.
pub struct CommitValidator<'a> {
    store: &'a dyn ObjectStore,
    cache: &'a DeviceOwnerCache,
    config: &'a ValidatorConfig,
    root: Option<RootInfo>,
}

impl<'a> CommitValidator<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        cache: &'a DeviceOwnerCache,
        config: &'a ValidatorConfig,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            root: None,
        }
    }

    /// Use an already decoded root instead of walking to it.
    pub fn with_root(mut self, root: RootInfo) -> Self {
        self.root = Some(root);
        self
    }

    pub fn root(&self) -> Option<&RootInfo> {
        self.root.as_ref()
    }

    /// Judge a single commit.
    pub fn validate(&mut self, id: &ObjectId) -> Result<CommitKind, Rejection> {
        let result = self.check(id);
        match &result {
            Ok(kind) => debug!(commit = %id.short_hex(), ?kind, "commit accepted"),
            Err(rejection) => warn!(
                commit = %id.short_hex(),
                kind = %rejection.kind,
                reason = %rejection.reason,
                "commit rejected"
            ),
        }
        result
    }

    /// Judge `ids` oldest first; the first rejection stops the batch.
    pub fn validate_batch(&mut self, ids: &[ObjectId]) -> Result<(), Rejection> {
        for id in ids {
            self.validate(id)?;
        }
        Ok(())
    }

    fn check(&mut self, id: &ObjectId) -> Result<CommitKind, Rejection> {
        let commit = self
            .store
            .read_commit(id)
            .map_err(|e| Rejection::corrupt(*id, e))?;
        let parents = commit.parents.len();
        let msg = CommitMessage::parse(&commit.message).map_err(|e| {
            Rejection::new(*id, message_error_kind(parents, None, &e), e.to_string())
        })?;
        let kind = CommitKind::classify(parents, &msg).map_err(|e| {
            Rejection::new(
                *id,
                message_error_kind(parents, msg.message_type(), &e),
                e.to_string(),
            )
        })?;

        let ctx = CommitContext::load(self.store, self.cache, self.config, *id, &commit)?;
        match &kind {
            CommitKind::Initial { mode, invited } => {
                let uri = rules::verify_author(&ctx, Side::Commit)?;
                rules::check_initial(&ctx, &uri, *mode, invited.as_deref())?;
                if self.root.is_none() {
                    self.root = Some(self.load_root(id)?);
                }
            }
            CommitKind::Member { action, uri: target } => {
                // A member removing themself is no longer in the commit tree.
                let side = if *action == MemberAction::Remove {
                    Side::Parent
                } else {
                    Side::Commit
                };
                let uri = rules::verify_author(&ctx, side)?;
                self.check_member(&ctx, &uri, action, target)?;
            }
            CommitKind::Vote { uri: target } => {
                let uri = rules::verify_author(&ctx, Side::Commit)?;
                rules::check_vote(&ctx, &uri, target)?;
            }
            CommitKind::ProfileUpdate => {
                let uri = rules::verify_author(&ctx, Side::Commit)?;
                rules::check_profile(&ctx, &uri)?;
            }
            CommitKind::EditedMessage { edit } => {
                let uri = rules::verify_author(&ctx, Side::Commit)?;
                rules::check_edit(&ctx, &uri, edit)?;
            }
            CommitKind::Merge => {
                rules::verify_author(&ctx, Side::Commit)?;
            }
            CommitKind::Content { .. } => {
                let uri = rules::verify_author(&ctx, Side::Commit)?;
                rules::check_user_diff(&ctx, &uri, ErrorKind::MalformedGenericCommit)?;
            }
        }
        Ok(kind)
    }

    fn check_member(
        &mut self,
        ctx: &CommitContext<'_>,
        uri: &str,
        action: &MemberAction,
        target: &str,
    ) -> RuleResult {
        match action {
            MemberAction::Add => {
                let root = self.root_for(&ctx.id)?;
                rules::check_add(ctx, uri, target, &root)
            }
            MemberAction::Join => rules::check_join(ctx, uri, target),
            MemberAction::Remove => rules::check_remove(ctx, uri, target),
            MemberAction::Ban => rules::check_resolution(ctx, uri, target, VoteDirection::Ban),
            MemberAction::Unban => rules::check_resolution(ctx, uri, target, VoteDirection::Unban),
            MemberAction::Unknown(other) => Err(ctx.reject(
                ErrorKind::MalformedMemberCommit,
                format!("unknown member action {other:?}"),
            )),
        }
    }

    fn root_for(&mut self, id: &ObjectId) -> RuleResult<RootInfo> {
        if let Some(root) = &self.root {
            return Ok(root.clone());
        }
        let root = RootInfo::find(self.store, id)
            .map_err(|e| Rejection::new(*id, e.kind(), e.to_string()))?;
        self.root = Some(root.clone());
        Ok(root)
    }

    fn load_root(&self, id: &ObjectId) -> RuleResult<RootInfo> {
        RootInfo::load(self.store, id).map_err(|e| Rejection::new(*id, e.kind(), e.to_string()))
    }
}

/// Validate `ids` oldest first with a fresh validator.
pub fn validate_batch(
    store: &dyn ObjectStore,
    cache: &DeviceOwnerCache,
    config: &ValidatorConfig,
    ids: &[ObjectId],
) -> Result<(), Rejection> {
    CommitValidator::new(store, cache, config).validate_batch(ids)
}

/// Error kind for a commit whose message cannot be decoded.
fn message_error_kind(parents: usize, message_type: Option<&str>, err: &MessageError) -> ErrorKind {
    match (parents, message_type) {
        (0, _) if matches!(err, MessageError::InvalidMode(_)) => ErrorKind::InvalidMode,
        (0, _) => ErrorKind::MalformedInitialCommit,
        (_, Some(TYPE_MEMBER)) => ErrorKind::MalformedMemberCommit,
        (_, Some(TYPE_VOTE)) => ErrorKind::MalformedVote,
        (_, Some(TYPE_EDITED_MESSAGE)) => ErrorKind::MalformedEditCommit,
        (_, Some(_)) if matches!(err, MessageError::MissingKey("edit")) => {
            ErrorKind::MalformedEditCommit
        }
        _ => ErrorKind::MalformedGenericCommit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convlog_crypto::Signature;
    use convlog_membership::{apply_resolution, paths, TargetKind};
    use convlog_store::InMemoryObjectStore;
    use convlog_types::ConversationMode;

    use crate::testutil::{sign, Peer, Timeline};

    fn check_all(timeline: &Timeline, config: &ValidatorConfig) -> Result<(), Rejection> {
        let cache = DeviceOwnerCache::new();
        validate_batch(&timeline.store, &cache, config, &timeline.commits)
    }

    fn check_one(timeline: &Timeline, id: &ObjectId) -> Result<CommitKind, Rejection> {
        let cache = DeviceOwnerCache::new();
        let config = ValidatorConfig::default();
        CommitValidator::new(&timeline.store, &cache, &config).validate(id)
    }

    // ---- Test 1: a full one-to-one life cycle is accepted ----

    #[test]
    fn invite_join_talk_and_ban() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        timeline.join(&bob);
        timeline.text(&alice, "hi bob");
        timeline.text(&bob, "hi alice");
        timeline.vote(&alice, VoteDirection::Ban, TargetKind::Members, &bob.uri());
        let ban = timeline.resolve(&alice, VoteDirection::Ban, TargetKind::Members, &bob.uri());

        check_all(&timeline, &ValidatorConfig::default()).unwrap();
        assert_eq!(
            check_one(&timeline, &ban).unwrap(),
            CommitKind::Member {
                action: MemberAction::Ban,
                uri: bob.uri()
            }
        );
    }

    #[test]
    fn group_add_join_and_leave() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::group(&alice, ConversationMode::InvitesOnly);
        timeline.add(&alice, &bob.uri());
        timeline.join(&bob);

        let mut snap = timeline.snapshot();
        snap.remove(&paths::member_cert(&bob.uri()));
        snap.remove(&paths::device_cert(&bob.device_id()));
        let msg = timeline.member(MemberAction::Remove, &bob.uri());
        timeline.commit(&bob, &snap, &msg);

        check_all(&timeline, &ValidatorConfig::default()).unwrap();
    }

    // ---- Test 2: tampering is detected ----

    #[test]
    fn flipped_signature_byte() {
        let alice = Peer::new("alice");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let id = timeline.text(&alice, "hello");

        let mut commit = timeline.store.read_commit(&id).unwrap();
        let mut bytes = commit.signature.to_bytes();
        bytes[7] ^= 0x01;
        commit.signature = Signature::from_bytes(&bytes);
        let forged = timeline.store.write_commit(&commit).unwrap();

        let err = check_one(&timeline, &forged).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadSignature);
        assert_eq!(err.commit, forged);
    }

    #[test]
    fn extra_file_in_text_commit() {
        let alice = Peer::new("alice");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let mut snap = timeline.snapshot();
        snap.put_file(&timeline.store, "admins/mallory.crt", b"cert").unwrap();
        timeline.commit(&alice, &snap, &CommitMessage::text("sneaky"));
        timeline.text(&alice, "after");

        let err = check_all(&timeline, &ValidatorConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedGenericCommit);
        assert_eq!(err.commit, timeline.commits[1]);
    }

    #[test]
    fn join_without_invite() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let id = timeline.join(&bob);
        let err = check_one(&timeline, &id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMemberCommit);
    }

    #[test]
    fn unknown_member_action() {
        let alice = Peer::new("alice");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let snap = timeline.snapshot();
        let msg = timeline.member(MemberAction::parse("promote"), "someone");
        let id = timeline.commit(&alice, &snap, &msg);
        assert_eq!(
            check_one(&timeline, &id).unwrap_err().kind(),
            ErrorKind::MalformedMemberCommit
        );
    }

    // ---- Test 3: authors and certificates ----

    #[test]
    fn expired_device_at_commit_time() {
        let alice = Peer::expiring("alice", 1_005);
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let id = timeline.text(&alice, "too late");
        assert!(check_one(&timeline, &timeline.root).is_ok());
        assert_eq!(
            check_one(&timeline, &id).unwrap_err().kind(),
            ErrorKind::InvalidUserAtCommit
        );
    }

    #[test]
    fn stranger_cannot_post() {
        let alice = Peer::new("alice");
        let mallory = Peer::new("mallory");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let id = timeline.text(&mallory, "let me in");
        assert_eq!(
            check_one(&timeline, &id).unwrap_err().kind(),
            ErrorKind::InvalidUserAtCommit
        );
    }

    #[test]
    fn add_rules() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let carol = Peer::new("carol");

        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        let outsider = timeline.add(&alice, &carol.uri());
        assert_eq!(
            check_one(&timeline, &outsider).unwrap_err().kind(),
            ErrorKind::MalformedMemberCommit
        );

        let mut group = Timeline::group(&alice, ConversationMode::AdminInvitesOnly);
        let self_add = group.add(&alice, &alice.uri());
        assert!(check_one(&group, &self_add).is_err());
    }

    #[test]
    fn admin_invites_only_needs_an_admin() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let carol = Peer::new("carol");
        let mut timeline = Timeline::group(&alice, ConversationMode::AdminInvitesOnly);
        timeline.add(&alice, &bob.uri());
        timeline.join(&bob);
        let id = timeline.add(&bob, &carol.uri());
        assert_eq!(
            check_one(&timeline, &id).unwrap_err().kind(),
            ErrorKind::MalformedMemberCommit
        );

        let mut open = Timeline::group(&alice, ConversationMode::InvitesOnly);
        open.add(&alice, &bob.uri());
        open.join(&bob);
        open.add(&bob, &carol.uri());
        check_all(&open, &ValidatorConfig::default()).unwrap();
    }

    #[test]
    fn banned_target_cannot_be_added_back() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        timeline.join(&bob);
        timeline.vote(&alice, VoteDirection::Ban, TargetKind::Members, &bob.uri());
        timeline.resolve(&alice, VoteDirection::Ban, TargetKind::Members, &bob.uri());
        let readd = timeline.add(&alice, &bob.uri());

        let err = check_one(&timeline, &readd).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMemberCommit);
        assert!(err.reason.contains("banned"), "{}", err.reason);
    }

    #[test]
    fn remove_only_takes_the_targets_devices() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let carol = Peer::new("carol");
        let mut timeline = Timeline::group(&alice, ConversationMode::InvitesOnly);
        timeline.add(&alice, &bob.uri());
        timeline.join(&bob);
        timeline.add(&alice, &carol.uri());
        let before = timeline.join(&carol);

        let mut snap = timeline.snapshot();
        snap.remove(&paths::member_cert(&bob.uri()));
        snap.remove(&paths::device_cert(&bob.device_id()));
        let msg = timeline.member(MemberAction::Remove, &bob.uri());
        let clean = timeline.commit(&alice, &snap, &msg);
        assert!(check_one(&timeline, &clean).is_ok());

        timeline.head = before;
        snap.remove(&paths::device_cert(&carol.device_id()));
        let greedy = timeline.commit(&alice, &snap, &msg);
        let err = check_one(&timeline, &greedy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMemberCommit);
        assert!(err.reason.contains("does not belong"), "{}", err.reason);
    }

    #[test]
    fn resolution_touches_nothing_else() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        timeline.join(&bob);
        timeline.vote(&alice, VoteDirection::Ban, TargetKind::Members, &bob.uri());

        let mut snap = timeline.snapshot();
        apply_resolution(&timeline.store, &mut snap, VoteDirection::Ban, TargetKind::Members, &bob.uri())
            .unwrap();
        snap.put_file(&timeline.store, "notes.txt", b"while we are here").unwrap();
        let msg = timeline.member(MemberAction::Ban, &bob.uri());
        let id = timeline.commit(&alice, &snap, &msg);

        let err = check_one(&timeline, &id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMemberCommit);
        assert!(err.reason.contains("unwanted file notes.txt"), "{}", err.reason);
    }

    #[test]
    fn resolution_counts_only_admin_markers() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let carol = Peer::new("carol");
        let mut timeline = Timeline::group(&alice, ConversationMode::InvitesOnly);
        timeline.add(&alice, &bob.uri());
        timeline.join(&bob);
        timeline.add(&alice, &carol.uri());
        timeline.join(&carol);
        // Marker from a plain member, smuggled in by a commit that is itself invalid.
        timeline.vote(&bob, VoteDirection::Ban, TargetKind::Members, &carol.uri());
        let ban = timeline.resolve(&alice, VoteDirection::Ban, TargetKind::Members, &carol.uri());

        let err = check_one(&timeline, &ban).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMemberCommit);
        assert!(err.reason.contains("incomplete vote: 0/1"), "{}", err.reason);
    }

    // ---- Test 4: votes and quorum ----

    #[test]
    fn vote_from_non_admin() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        timeline.join(&bob);
        let id = timeline.vote(&bob, VoteDirection::Ban, TargetKind::Admins, &alice.uri());
        assert_eq!(
            check_one(&timeline, &id).unwrap_err().kind(),
            ErrorKind::MalformedVote
        );
    }

    #[test]
    fn self_vote_rejected() {
        let alice = Peer::new("alice");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);
        let id = timeline.vote(&alice, VoteDirection::Ban, TargetKind::Admins, &alice.uri());
        assert_eq!(
            check_one(&timeline, &id).unwrap_err().kind(),
            ErrorKind::MalformedVote
        );
    }

    #[test]
    fn half_the_admins_is_not_enough() {
        let alice = Peer::new("alice");
        let carol = Peer::new("carol");
        let dave = Peer::new("dave");
        let mut timeline = Timeline::group(&alice, ConversationMode::Public);

        // Second admin, written directly into the tree.
        let mut snap = timeline.snapshot();
        snap.put_file(&timeline.store, paths::admin_cert(&carol.uri()), &carol.account_cert())
            .unwrap();
        snap.put_file(
            &timeline.store,
            paths::device_cert(&carol.device_id()),
            &carol.device_cert(),
        )
        .unwrap();
        timeline.commit(&alice, &snap, &CommitMessage::text("promote carol"));
        timeline.add(&alice, &dave.uri());
        let voted = timeline.vote(&alice, VoteDirection::Ban, TargetKind::Invited, &dave.uri());
        assert!(check_one(&timeline, &voted).is_ok());

        let early = timeline.resolve(&alice, VoteDirection::Ban, TargetKind::Invited, &dave.uri());
        let err = check_one(&timeline, &early).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedMemberCommit);
        assert!(err.reason.contains("1/2"));

        timeline.head = voted;
        timeline.vote(&carol, VoteDirection::Ban, TargetKind::Invited, &dave.uri());
        let resolved = timeline.resolve(&alice, VoteDirection::Ban, TargetKind::Invited, &dave.uri());
        assert!(check_one(&timeline, &resolved).is_ok());
        assert!(timeline.snapshot().contains(&format!("banned/invited/{}", dave.uri())));
    }

    #[test]
    fn unban_restores_member() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        timeline.join(&bob);
        timeline.vote(&alice, VoteDirection::Ban, TargetKind::Members, &bob.uri());
        timeline.resolve(&alice, VoteDirection::Ban, TargetKind::Members, &bob.uri());
        timeline.vote(&alice, VoteDirection::Unban, TargetKind::Members, &bob.uri());
        timeline.resolve(&alice, VoteDirection::Unban, TargetKind::Members, &bob.uri());

        check_all(&timeline, &ValidatorConfig::default()).unwrap();
        assert!(timeline.snapshot().contains(&paths::member_cert(&bob.uri())));
    }

    // ---- Test 5: profile and edits ----

    #[test]
    fn profile_update_permission_level() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        timeline.join(&bob);
        let mut snap = timeline.snapshot();
        snap.put_file(&timeline.store, paths::PROFILE, b"BEGIN:VCARD\r\nEND:VCARD")
            .unwrap();
        let id = timeline.commit(&bob, &snap, &CommitKind::ProfileUpdate.to_message());

        let cache = DeviceOwnerCache::new();
        let strict = ValidatorConfig::default();
        let err = CommitValidator::new(&timeline.store, &cache, &strict)
            .validate(&id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnauthorizedProfileUpdate);

        let permissive = ValidatorConfig::permissive();
        CommitValidator::new(&timeline.store, &cache, &permissive)
            .validate(&id)
            .unwrap();
    }

    #[test]
    fn edits_need_same_author_and_text() {
        let alice = Peer::new("alice");
        let bob = Peer::new("bob");
        let mut timeline = Timeline::one_to_one(&alice, &bob.uri());
        timeline.join(&bob);
        let original = timeline.text(&alice, "typo");

        let edit = CommitMessage::text("fixed").with("edit", original.to_hex());
        let snap = timeline.snapshot();
        let own = timeline.commit(&alice, &snap, &edit);
        assert!(matches!(
            check_one(&timeline, &own).unwrap(),
            CommitKind::EditedMessage { .. }
        ));

        let foreign = timeline.commit(&bob, &snap, &edit);
        assert_eq!(
            check_one(&timeline, &foreign).unwrap_err().kind(),
            ErrorKind::MalformedEditCommit
        );

        let missing = CommitMessage::text("x").with("edit", ObjectId::from_bytes(b"nope").to_hex());
        let dangling = timeline.commit(&alice, &snap, &missing);
        assert_eq!(
            check_one(&timeline, &dangling).unwrap_err().kind(),
            ErrorKind::MalformedEditCommit
        );
    }

    // ---- Test 6: roots ----

    #[test]
    fn root_with_bad_mode() {
        let alice = Peer::new("alice");
        let store = InMemoryObjectStore::new();
        let mut snap = convlog_store::Snapshot::new();
        snap.put_file(&store, paths::admin_cert(&alice.uri()), &alice.account_cert())
            .unwrap();
        snap.put_file(&store, paths::device_cert(&alice.device_id()), &alice.device_cert())
            .unwrap();
        let msg = CommitMessage::new("initial").with("mode", 7);
        let id = sign(&store, &alice, &snap, &msg, vec![], 1_000);

        let cache = DeviceOwnerCache::new();
        let config = ValidatorConfig::default();
        let err = CommitValidator::new(&store, &cache, &config)
            .validate(&id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMode);
    }

    #[test]
    fn one_to_one_root_needs_empty_invite() {
        let alice = Peer::new("alice");
        let store = InMemoryObjectStore::new();
        let mut snap = convlog_store::Snapshot::new();
        snap.put_file(&store, paths::admin_cert(&alice.uri()), &alice.account_cert())
            .unwrap();
        snap.put_file(&store, paths::device_cert(&alice.device_id()), &alice.device_cert())
            .unwrap();
        snap.put_file(&store, paths::invited("bob"), b"not empty").unwrap();
        let msg = CommitKind::Initial {
            mode: ConversationMode::OneToOne,
            invited: Some("bob".into()),
        }
        .to_message();
        let id = sign(&store, &alice, &snap, &msg, vec![], 1_000);

        let cache = DeviceOwnerCache::new();
        let config = ValidatorConfig::default();
        let mut validator = CommitValidator::new(&store, &cache, &config);
        let err = validator.validate(&id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInitialCommit);
        assert!(validator.root().is_none());
    }
}
