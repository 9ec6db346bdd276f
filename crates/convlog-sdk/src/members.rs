//! Membership changes: invitations, joins, departures and votes.

use tracing::info;

use convlog_membership::paths;
use convlog_membership::{
    apply_resolution, devices_of, member_certificate, role_of, tally, TargetKind, VoteDirection,
    VotePath,
};
use convlog_types::{ConversationMode, MemberRole, ObjectId};
use convlog_validator::{CommitKind, MemberAction};

use crate::conversation::Conversation;
use crate::error::{ConversationError, ConversationResult};

/// Commits produced by one ballot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoteOutcome {
    /// The vote commit; `None` when the ballot was already cast.
    pub vote: Option<ObjectId>,
    /// The resolution commit, when the ballot completed the quorum.
    pub resolution: Option<ObjectId>,
}

impl Conversation {
    /// Invite `uri`.
    pub fn add_member(&self, uri: &str) -> ConversationResult<ObjectId> {
        let me = self.account.uri();
        let (head, mut snap) = self.head_snapshot()?;
        match role_of(&snap, uri) {
            Some(MemberRole::Invited) => return Err(ConversationError::AlreadyInvited(uri.into())),
            Some(MemberRole::Admin | MemberRole::Member) => {
                return Err(ConversationError::AlreadyMember(uri.into()));
            }
            Some(MemberRole::Banned) => return Err(ConversationError::Banned(uri.into())),
            _ => {}
        }
        match self.root.mode {
            ConversationMode::OneToOne if !self.root.initial_members.iter().any(|m| m == uri) => {
                return Err(ConversationError::InvalidMode(format!(
                    "{uri} cannot be added to a one-to-one conversation"
                )));
            }
            ConversationMode::AdminInvitesOnly if role_of(&snap, &me) != Some(MemberRole::Admin) => {
                return Err(ConversationError::NotAdmin(me));
            }
            _ => {}
        }

        self.announce(&mut snap)?;
        snap.put_file(&*self.store, paths::invited(uri), b"")?;
        let id = self.commit(head, &snap, &member_message(MemberAction::Add, uri))?;
        info!(conversation = %self.id.short_hex(), uri, "invited member");
        Ok(id)
    }

    /// Accept an invitation. Returns `None` when already a member.
    pub fn join(&self) -> ConversationResult<Option<ObjectId>> {
        let uri = self.account.uri();
        let (head, mut snap) = self.head_snapshot()?;
        match role_of(&snap, &uri) {
            Some(MemberRole::Admin | MemberRole::Member) => return Ok(None),
            Some(MemberRole::Invited) => {}
            Some(MemberRole::Banned) => return Err(ConversationError::Banned(uri)),
            _ => return Err(ConversationError::NotInvited(uri)),
        }

        snap.remove(&paths::invited(&uri));
        snap.put_file(
            &*self.store,
            paths::member_cert(&uri),
            &self.account.account_certificate().to_bytes(),
        )?;
        self.announce(&mut snap)?;
        let id = self.commit(head, &snap, &member_message(MemberAction::Join, &uri))?;
        info!(conversation = %self.id.short_hex(), %uri, "joined");
        Ok(Some(id))
    }

    /// Remove the account and all of its devices from the conversation.
    pub fn leave(&self) -> ConversationResult<ObjectId> {
        let uri = self.account.uri();
        let (head, mut snap) = self.head_snapshot()?;
        if member_certificate(&snap, &uri).is_none() {
            return Err(ConversationError::NotMember(uri));
        }

        snap.remove(&paths::admin_cert(&uri));
        snap.remove(&paths::member_cert(&uri));
        snap.remove(&paths::crl(&uri));
        for device in devices_of(&*self.store, &snap, &uri)? {
            snap.remove(&paths::device_cert(&device));
        }
        let id = self.commit(head, &snap, &member_message(MemberAction::Remove, &uri))?;
        info!(conversation = %self.id.short_hex(), %uri, "left");
        Ok(id)
    }

    /// Vote to ban `target`, resolving the vote once admins reach quorum.
    pub fn vote_kick(&self, target: &str, kind: TargetKind) -> ConversationResult<VoteOutcome> {
        self.vote(VoteDirection::Ban, kind, target)
    }

    /// Vote to lift the ban on `target`.
    pub fn vote_unban(&self, target: &str, kind: TargetKind) -> ConversationResult<VoteOutcome> {
        self.vote(VoteDirection::Unban, kind, target)
    }

    fn vote(
        &self,
        direction: VoteDirection,
        kind: TargetKind,
        target: &str,
    ) -> ConversationResult<VoteOutcome> {
        let me = self.account.uri();
        let (head, mut snap) = self.head_snapshot()?;
        if role_of(&snap, &me) != Some(MemberRole::Admin) {
            return Err(ConversationError::NotAdmin(me));
        }
        let own_target = match kind {
            TargetKind::Devices => target == self.account.device_id(),
            _ => target == me,
        };
        let present = match direction {
            VoteDirection::Ban => snap.contains(&kind.active_path(target)),
            VoteDirection::Unban => snap.contains(&kind.banned_path(target)),
        };
        if own_target || !present {
            return Err(ConversationError::NothingToVote(target.into()));
        }

        let ballot = VotePath::new(direction, kind, target, me.as_str()).to_path();
        let vote = if snap.contains(&ballot) {
            None
        } else {
            self.announce(&mut snap)?;
            snap.put_file(&*self.store, ballot, b"")?;
            let msg = CommitKind::Vote {
                uri: target.to_string(),
            }
            .to_message();
            Some(self.commit(head, &snap, &msg)?)
        };

        let count = tally(&snap, direction, kind, target);
        info!(
            conversation = %self.id.short_hex(),
            %direction,
            %kind,
            uri = target,
            votes = count.votes,
            admins = count.admins,
            "vote cast"
        );
        let resolution = if count.reached() {
            Some(self.resolve_vote(target, kind, direction)?)
        } else {
            None
        };
        Ok(VoteOutcome { vote, resolution })
    }

    /// Apply a completed vote: move the target to or from `banned/`.
    pub fn resolve_vote(
        &self,
        target: &str,
        kind: TargetKind,
        direction: VoteDirection,
    ) -> ConversationResult<ObjectId> {
        let me = self.account.uri();
        let (head, mut snap) = self.head_snapshot()?;
        if role_of(&snap, &me) != Some(MemberRole::Admin) {
            return Err(ConversationError::NotAdmin(me));
        }
        let count = tally(&snap, direction, kind, target);
        if !count.reached() {
            return Err(ConversationError::IncompleteVote {
                target: target.into(),
                votes: count.votes,
                admins: count.admins,
            });
        }

        let removed = apply_resolution(&*self.store, &mut snap, direction, kind, target)?;
        self.announce(&mut snap)?;
        let action = match direction {
            VoteDirection::Ban => MemberAction::Ban,
            VoteDirection::Unban => MemberAction::Unban,
        };
        let id = self.commit(head, &snap, &member_message(action, target))?;
        info!(
            conversation = %self.id.short_hex(),
            %direction,
            uri = target,
            devices = removed.len(),
            "vote resolved"
        );
        Ok(id)
    }
}

fn member_message(action: MemberAction, uri: &str) -> convlog_validator::CommitMessage {
    CommitKind::Member {
        action,
        uri: uri.to_string(),
    }
    .to_message()
}
