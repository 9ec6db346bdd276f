//! Per-kind commit rules.
//!
//! Each rule sees the commit, the flattened trees at the commit and at its
//! first parent, and the path-level diff between them. A rule either passes
//! or returns the [`Rejection`] naming what is wrong.

use std::collections::HashSet;

use convlog_crypto::{verify_certificate, Certificate};
use convlog_diff::{diff_snapshots, TreeChange, TreeDiff};
use convlog_membership::paths::{self, BANNED, PROFILE};
use convlog_membership::{
    admins, device_certificate, member_certificate, parse_vote_path, role_of, DeviceOwnerCache,
    Tally, TargetKind, VoteDirection,
};
use convlog_store::{CommitObject, ObjectStore, ObjectStoreExt, Snapshot, StoreError};
use convlog_types::{ConversationMode, ErrorKind, MemberRole, ObjectId};

use crate::config::ValidatorConfig;
use crate::error::Rejection;
use crate::message::{CommitMessage, TYPE_DATA_TRANSFER, TYPE_TEXT};
use crate::root::RootInfo;

pub(crate) type RuleResult<T = ()> = Result<T, Rejection>;

/// Which tree a check reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    Parent,
    Commit,
}

/// Everything a rule needs to judge one commit.
pub(crate) struct CommitContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub cache: &'a DeviceOwnerCache,
    pub config: &'a ValidatorConfig,
    pub id: ObjectId,
    pub commit: &'a CommitObject,
    pub old: Snapshot,
    pub new: Snapshot,
    pub diff: TreeDiff,
}

impl<'a> CommitContext<'a> {
    pub fn load(
        store: &'a dyn ObjectStore,
        cache: &'a DeviceOwnerCache,
        config: &'a ValidatorConfig,
        id: ObjectId,
        commit: &'a CommitObject,
    ) -> RuleResult<Self> {
        let corrupt = |e: StoreError| Rejection::corrupt(id, e);
        let new = Snapshot::load(store, &commit.tree).map_err(corrupt)?;
        let old = match commit.parents.first() {
            Some(parent) => {
                let parent = store.read_commit(parent).map_err(corrupt)?;
                Snapshot::load(store, &parent.tree).map_err(corrupt)?
            }
            None => Snapshot::new(),
        };
        let diff = diff_snapshots(&old, &new);
        Ok(Self {
            store,
            cache,
            config,
            id,
            commit,
            old,
            new,
            diff,
        })
    }

    pub fn reject(&self, kind: ErrorKind, reason: impl Into<String>) -> Rejection {
        Rejection::new(self.id, kind, reason)
    }

    pub fn corrupt(&self, err: impl std::fmt::Display) -> Rejection {
        Rejection::corrupt(self.id, err)
    }

    pub fn tree(&self, side: Side) -> &Snapshot {
        match side {
            Side::Parent => &self.old,
            Side::Commit => &self.new,
        }
    }

    /// Device id that signed the commit.
    pub fn device(&self) -> &str {
        &self.commit.author.device
    }

    pub fn own_device_path(&self) -> String {
        paths::device_cert(self.device())
    }

    pub fn read(&self, side: Side, path: &str) -> RuleResult<Option<Vec<u8>>> {
        self.tree(side)
            .read_file(self.store, path)
            .map_err(|e| self.corrupt(e))
    }

    fn is_empty_file(&self, side: Side, path: &str) -> RuleResult<bool> {
        Ok(self.read(side, path)?.is_some_and(|data| data.is_empty()))
    }

    fn device_owner_in(&self, side: Side, device: &str) -> RuleResult<Option<String>> {
        Ok(device_certificate(self.store, self.tree(side), device)
            .map_err(|e| self.corrupt(e))?
            .map(|cert| cert.issuer_uid()))
    }
}

// ---------------------------------------------------------------------------
// Author
// ---------------------------------------------------------------------------

/// Check the author device and its account at commit time, then the commit
/// signature. Returns the author uri.
pub(crate) fn verify_author(ctx: &CommitContext<'_>, side: Side) -> RuleResult<String> {
    let invalid = |reason: String| ctx.reject(ErrorKind::InvalidUserAtCommit, reason);
    let snap = ctx.tree(side);
    let device = ctx.device();

    let data = ctx
        .read(side, &ctx.own_device_path())?
        .ok_or_else(|| invalid(format!("no certificate for device {device}")))?;
    let device_cert =
        Certificate::from_bytes(&data).map_err(|e| invalid(format!("device certificate: {e}")))?;
    if device_cert.id() != device {
        return Err(invalid(format!("certificate of {device} names another key")));
    }

    let uri = ctx
        .cache
        .owner(ctx.store, snap, device)
        .map_err(|e| ctx.corrupt(e))?
        .ok_or_else(|| invalid(format!("device {device} has no owner")))?;
    if device_cert.issuer_uid() != uri {
        return Err(invalid(format!("device {device} is not issued by {uri}")));
    }

    let account_blob =
        member_certificate(snap, &uri).ok_or_else(|| invalid(format!("{uri} is not a member")))?;
    let account_data = ctx
        .store
        .read_blob(&account_blob)
        .map_err(|e| ctx.corrupt(e))?;
    let account = Certificate::from_bytes(&account_data)
        .map_err(|e| invalid(format!("account certificate: {e}")))?;
    if account.id() != uri {
        return Err(invalid(format!("account certificate of {uri} names another key")));
    }
    if account.verify_signature().is_err() || device_cert.verify_signature().is_err() {
        return Err(invalid("certificate signature does not verify".into()));
    }
    if device_cert.issuer_key != account.public_key {
        return Err(invalid(format!("device {device} issuer key mismatch")));
    }

    let ts = ctx.commit.timestamp;
    if device_cert.is_expired_at(ts) {
        return Err(invalid(format!("device certificate expired before {ts}")));
    }
    if account.is_expired_at(ts) {
        return Err(invalid(format!("account certificate expired before {ts}")));
    }

    let payload = ctx.commit.signing_payload().map_err(|e| ctx.corrupt(e))?;
    let key = device_cert
        .subject_key()
        .map_err(|e| ctx.reject(ErrorKind::BadSignature, e.to_string()))?;
    key.verify(&payload, &ctx.commit.signature)
        .map_err(|_| ctx.reject(ErrorKind::BadSignature, "commit signature does not verify"))?;
    Ok(uri)
}

/// A device file written by its own device: first announce or renewal.
fn check_device_announce(
    ctx: &CommitContext<'_>,
    uri: &str,
    change: &TreeChange,
    kind: ErrorKind,
) -> RuleResult {
    let path = change.path();
    if change.is_deleted() {
        return Err(ctx.reject(kind, format!("{path} removed")));
    }
    let data = ctx.read(Side::Commit, path)?.unwrap_or_default();
    let previous = ctx.read(Side::Parent, path)?;
    if !verify_certificate(&data, uri, previous.as_deref()) {
        return Err(ctx.reject(kind, format!("invalid certificate {path}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Initial
// ---------------------------------------------------------------------------

pub(crate) fn check_initial(
    ctx: &CommitContext<'_>,
    uri: &str,
    mode: ConversationMode,
    invited: Option<&str>,
) -> RuleResult {
    const K: ErrorKind = ErrorKind::MalformedInitialCommit;
    let admin_file = paths::admin_cert(uri);
    let device_file = ctx.own_device_path();
    let crl_file = paths::crl(uri);
    let invited_file = match (mode, invited) {
        (ConversationMode::OneToOne, Some(peer)) if peer != uri => Some(paths::invited(peer)),
        (ConversationMode::OneToOne, _) => {
            return Err(ctx.reject(K, "one-to-one conversation without a peer"));
        }
        _ => None,
    };

    let (mut has_admin, mut has_device, mut has_invited) = (false, false, false);
    for change in &ctx.diff {
        let path = change.path();
        if path == admin_file || path == device_file {
            let data = ctx.read(Side::Commit, path)?.unwrap_or_default();
            if !verify_certificate(&data, uri, None) {
                return Err(ctx.reject(K, format!("invalid certificate {path}")));
            }
            if path == admin_file {
                has_admin = true;
            } else {
                has_device = true;
            }
        } else if path == crl_file {
            continue;
        } else if invited_file.as_deref() == Some(path) {
            if !ctx.is_empty_file(Side::Commit, path)? {
                return Err(ctx.reject(K, format!("{path} is not empty")));
            }
            has_invited = true;
        } else {
            return Err(ctx.reject(K, format!("unwanted file {path}")));
        }
    }

    if !has_admin || !has_device {
        return Err(ctx.reject(K, "admin or device certificate missing"));
    }
    if invited_file.is_some() && !has_invited {
        return Err(ctx.reject(K, "invited peer not recorded"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Member actions
// ---------------------------------------------------------------------------

pub(crate) fn check_add(
    ctx: &CommitContext<'_>,
    uri: &str,
    target: &str,
    root: &RootInfo,
) -> RuleResult {
    const K: ErrorKind = ErrorKind::MalformedMemberCommit;
    if root.mode == ConversationMode::OneToOne && !root.initial_members.iter().any(|m| m == target) {
        return Err(ctx.reject(K, format!("{target} is not part of this one-to-one")));
    }
    if target == uri {
        return Err(ctx.reject(K, "cannot add self"));
    }
    if ctx.diff.is_empty() || ctx.diff.len() > 3 {
        return Err(ctx.reject(K, format!("{} changed files", ctx.diff.len())));
    }

    let invited_file = paths::invited(target);
    let device_file = ctx.own_device_path();
    let crl_file = paths::crl(uri);
    let mut invited_added = false;
    for change in &ctx.diff {
        let path = change.path();
        if path == invited_file {
            if !change.is_added() || !ctx.is_empty_file(Side::Commit, path)? {
                return Err(ctx.reject(K, format!("{path} must be a new empty file")));
            }
            invited_added = true;
        } else if path == device_file {
            check_device_announce(ctx, uri, change, K)?;
        } else if path != crl_file {
            return Err(ctx.reject(K, format!("unwanted file {path}")));
        }
    }
    if !invited_added {
        return Err(ctx.reject(K, format!("{target} not invited")));
    }

    let banned = [TargetKind::Members, TargetKind::Admins, TargetKind::Invited]
        .iter()
        .any(|kind| ctx.old.contains(&kind.banned_path(target)));
    if banned {
        return Err(ctx.reject(K, format!("{target} is banned")));
    }
    if matches!(
        role_of(&ctx.old, target),
        Some(MemberRole::Admin | MemberRole::Member)
    ) {
        return Err(ctx.reject(K, format!("{target} is already a member")));
    }
    if root.mode == ConversationMode::AdminInvitesOnly
        && role_of(&ctx.old, uri) != Some(MemberRole::Admin)
    {
        return Err(ctx.reject(K, "only admins may invite"));
    }
    Ok(())
}

pub(crate) fn check_join(ctx: &CommitContext<'_>, uri: &str, target: &str) -> RuleResult {
    const K: ErrorKind = ErrorKind::MalformedMemberCommit;
    if target != uri {
        return Err(ctx.reject(K, format!("{uri} cannot join on behalf of {target}")));
    }
    let invited_file = paths::invited(target);
    let member_file = paths::member_cert(target);
    let device_file = ctx.own_device_path();

    for change in &ctx.diff {
        let path = change.path();
        if path == invited_file {
            if !change.is_deleted() {
                return Err(ctx.reject(K, format!("{path} not removed")));
            }
        } else if path == member_file {
            if !change.is_added() {
                return Err(ctx.reject(K, format!("{path} found too soon")));
            }
        } else if path == device_file {
            check_device_announce(ctx, uri, change, K)?;
        } else {
            return Err(ctx.reject(K, format!("unwanted file {path}")));
        }
    }

    if !ctx.old.contains(&invited_file) || ctx.new.contains(&invited_file) {
        return Err(ctx.reject(K, format!("{target} was not invited")));
    }
    let member_data = ctx
        .read(Side::Commit, &member_file)?
        .ok_or_else(|| ctx.reject(K, format!("{member_file} missing")))?;
    if !ctx.new.contains(&device_file) {
        return Err(ctx.reject(K, format!("{device_file} missing")));
    }
    let member = Certificate::from_bytes(&member_data).map_err(|e| ctx.reject(K, e.to_string()))?;
    let device_owner = ctx.device_owner_in(Side::Commit, ctx.device())?;
    if member.id() != target || device_owner.as_deref() != Some(target) {
        return Err(ctx.reject(K, format!("incorrect certificates for {target}")));
    }
    Ok(())
}

pub(crate) fn check_remove(ctx: &CommitContext<'_>, uri: &str, target: &str) -> RuleResult {
    const K: ErrorKind = ErrorKind::MalformedMemberCommit;
    if target != uri && role_of(&ctx.old, uri) != Some(MemberRole::Admin) {
        return Err(ctx.reject(K, "only admins may remove others"));
    }
    if ctx.diff.is_empty() {
        return Err(ctx.reject(K, "nothing removed"));
    }

    let target_files = [
        paths::admin_cert(target),
        paths::member_cert(target),
        paths::invited(target),
    ];
    let crl_file = paths::crl(target);
    let device_file = ctx.own_device_path();
    for change in &ctx.diff {
        let path = change.path();
        if target_files.iter().any(|f| f == path) {
            if !change.is_deleted() {
                return Err(ctx.reject(K, format!("{path} must be removed")));
            }
        } else if path == crl_file || (path == device_file && change.is_deleted()) {
            continue;
        } else if path == device_file {
            check_device_announce(ctx, uri, change, K)?;
        } else if let Some(device) = paths::device_from_path(path) {
            if !change.is_deleted() {
                return Err(ctx.reject(K, format!("{path} must be removed")));
            }
            let owner = ctx.device_owner_in(Side::Parent, device)?;
            if owner.as_deref() != Some(target) && device != target {
                return Err(ctx.reject(K, format!("{path} does not belong to {target}")));
            }
        } else {
            return Err(ctx.reject(K, format!("unwanted file {path}")));
        }
    }
    Ok(())
}

/// A `ban`/`unban` commit applying a vote that reached quorum.
pub(crate) fn check_resolution(
    ctx: &CommitContext<'_>,
    uri: &str,
    target: &str,
    direction: VoteDirection,
) -> RuleResult {
    const K: ErrorKind = ErrorKind::MalformedMemberCommit;
    let moved_away = |change: &TreeChange| match direction {
        VoteDirection::Ban => change.is_deleted(),
        VoteDirection::Unban => change.is_added(),
    };
    let target_files = [
        paths::admin_cert(target),
        paths::member_cert(target),
        paths::invited(target),
    ];
    let crl_file = paths::crl(target);
    let device_file = ctx.own_device_path();

    let mut voters = HashSet::new();
    let mut banned_files = 0;
    for change in &ctx.diff {
        let path = change.path();
        if path == crl_file {
            continue;
        } else if target_files.iter().any(|f| f == path) {
            if !moved_away(change) {
                return Err(ctx.reject(K, format!("{path} not moved")));
            }
        } else if path == device_file {
            check_device_announce(ctx, uri, change, K)?;
        } else if let Some(vote) = parse_vote_path(path) {
            if vote.direction != direction || vote.target != target {
                return Err(ctx.reject(K, format!("invalid vote file {path}")));
            }
            if !change.is_deleted() {
                return Err(ctx.reject(K, format!("vote {path} added by a resolution")));
            }
            voters.insert(vote.voter);
        } else if let Some(device) = paths::device_from_path(path) {
            if !moved_away(change) {
                return Err(ctx.reject(K, format!("{path} not moved")));
            }
            let side = if change.is_deleted() {
                Side::Parent
            } else {
                Side::Commit
            };
            let owner = ctx.device_owner_in(side, device)?;
            if owner.as_deref() != Some(target) && device != target {
                return Err(ctx.reject(K, format!("{path} does not belong to {target}")));
            }
        } else if let Some(rest) = path.strip_prefix(BANNED).and_then(|p| p.strip_prefix('/')) {
            let valid = rest.split_once('/').is_some_and(|(kind, file)| {
                kind.parse::<TargetKind>()
                    .is_ok_and(|kind| kind.file_name(target) == file)
            });
            // A ban fills banned/, an unban empties it.
            let moved_in = match direction {
                VoteDirection::Ban => change.is_added(),
                VoteDirection::Unban => change.is_deleted(),
            };
            if !valid || !moved_in {
                return Err(ctx.reject(K, format!("invalid banned file {path}")));
            }
            banned_files += 1;
        } else {
            return Err(ctx.reject(K, format!("unwanted file {path}")));
        }
    }

    if role_of(&ctx.old, uri) != Some(MemberRole::Admin) {
        return Err(ctx.reject(K, format!("{uri} is not an admin")));
    }
    let admin_uris = admins(&ctx.old);
    let tally = Tally {
        votes: admin_uris.iter().filter(|a| voters.contains(*a)).count(),
        admins: admin_uris.len(),
    };
    if !tally.reached() {
        return Err(ctx.reject(
            K,
            format!("incomplete vote: {}/{}", tally.votes, tally.admins),
        ));
    }
    if banned_files == 0 {
        return Err(ctx.reject(K, "no file moved"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Votes
// ---------------------------------------------------------------------------

pub(crate) fn check_vote(ctx: &CommitContext<'_>, uri: &str, target: &str) -> RuleResult {
    const K: ErrorKind = ErrorKind::MalformedVote;
    if ctx.diff.is_empty() || ctx.diff.len() > 2 {
        return Err(ctx.reject(K, format!("{} changed files", ctx.diff.len())));
    }
    let device_file = ctx.own_device_path();
    let mut marker = None;
    for change in &ctx.diff {
        let path = change.path();
        if path == device_file {
            check_device_announce(ctx, uri, change, K)?;
        } else if path.starts_with("votes/") && marker.is_none() {
            marker = Some(change);
        } else {
            return Err(ctx.reject(K, format!("invalid vote file {path}")));
        }
    }
    let change = marker.ok_or_else(|| ctx.reject(K, "no vote recorded"))?;
    let path = change.path();

    if role_of(&ctx.old, uri) != Some(MemberRole::Admin) {
        return Err(ctx.reject(K, format!("vote from non admin {uri}")));
    }
    let vote = parse_vote_path(path).ok_or_else(|| ctx.reject(K, format!("invalid path {path}")))?;
    if vote.voter != uri {
        return Err(ctx.reject(K, format!("{uri} voted for {}", vote.voter)));
    }
    if vote.target != target {
        return Err(ctx.reject(K, format!("vote targets {} not {target}", vote.target)));
    }
    if !change.is_added() || !ctx.is_empty_file(Side::Commit, path)? {
        return Err(ctx.reject(K, format!("{path} must be a new empty file")));
    }

    let exists_before = match (vote.kind, vote.direction) {
        (TargetKind::Devices, _) if vote.target == ctx.device() => {
            return Err(ctx.reject(K, "vote against own device"));
        }
        (TargetKind::Devices, VoteDirection::Ban) => {
            ctx.old.contains(&paths::device_cert(&vote.target))
        }
        (_, _) if vote.target == uri => return Err(ctx.reject(K, "vote against self")),
        (_, VoteDirection::Ban) => {
            member_certificate(&ctx.old, &vote.target).is_some()
                || ctx.old.contains(&paths::invited(&vote.target))
        }
        (kind, VoteDirection::Unban) => ctx.old.contains(&kind.banned_path(&vote.target)),
    };
    if !exists_before {
        return Err(ctx.reject(K, format!("nothing to vote on for {}", vote.target)));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

pub(crate) fn check_profile(ctx: &CommitContext<'_>, uri: &str) -> RuleResult {
    let allowed = match role_of(&ctx.new, uri) {
        Some(role @ (MemberRole::Admin | MemberRole::Member)) => {
            role.satisfies(ctx.config.update_profile_perm_lvl)
        }
        _ => false,
    };
    if !allowed {
        return Err(ctx.reject(
            ErrorKind::UnauthorizedProfileUpdate,
            format!("{uri} may not update the profile"),
        ));
    }
    const K: ErrorKind = ErrorKind::MalformedProfileUpdate;
    let device_file = ctx.own_device_path();
    for change in &ctx.diff {
        let path = change.path();
        if path == PROFILE {
            continue;
        } else if path == device_file {
            check_device_announce(ctx, uri, change, K)?;
        } else {
            return Err(ctx.reject(K, format!("unwanted file {path}")));
        }
    }
    Ok(())
}

pub(crate) fn check_edit(ctx: &CommitContext<'_>, uri: &str, edit: &str) -> RuleResult {
    const K: ErrorKind = ErrorKind::MalformedEditCommit;
    let edited_id =
        ObjectId::from_hex(edit).map_err(|e| ctx.reject(K, format!("edit target: {e}")))?;
    let edited = match ctx.store.read_commit(&edited_id) {
        Ok(commit) => commit,
        Err(StoreError::NotFound(_)) => {
            return Err(ctx.reject(K, format!("edited commit {edit} not found")));
        }
        Err(e) => return Err(ctx.corrupt(e)),
    };

    let edited_tree = Snapshot::load(ctx.store, &edited.tree).map_err(|e| ctx.corrupt(e))?;
    let edited_author = ctx
        .cache
        .owner(ctx.store, &edited_tree, &edited.author.device)
        .map_err(|e| ctx.corrupt(e))?;
    if edited_author.as_deref() != Some(uri) {
        return Err(ctx.reject(K, format!("edited commit {edit} has another author")));
    }

    let msg = CommitMessage::parse(&edited.message).map_err(|e| ctx.reject(K, e.to_string()))?;
    let editable = match msg.message_type() {
        Some(TYPE_TEXT) => true,
        Some(TYPE_DATA_TRANSFER) => msg.contains("tid"),
        _ => false,
    };
    if !editable {
        return Err(ctx.reject(K, format!("commit {edit} is not editable")));
    }
    check_user_diff(ctx, uri, K)
}

/// A content commit may only touch the author's own certificates.
pub(crate) fn check_user_diff(ctx: &CommitContext<'_>, uri: &str, kind: ErrorKind) -> RuleResult {
    let admin_file = paths::admin_cert(uri);
    let member_file = paths::member_cert(uri);
    let device_file = ctx.own_device_path();
    for change in &ctx.diff {
        let path = change.path();
        if path == admin_file || path == member_file {
            let previous = ctx
                .read(Side::Parent, path)?
                .ok_or_else(|| ctx.reject(kind, format!("{path} added by a content commit")))?;
            let renewed = ctx
                .read(Side::Commit, path)?
                .ok_or_else(|| ctx.reject(kind, format!("{path} removed by a content commit")))?;
            if !verify_certificate(&renewed, uri, Some(&previous)) {
                return Err(ctx.reject(kind, format!("invalid certificate {path}")));
            }
        } else if path == device_file {
            check_device_announce(ctx, uri, change, kind)?;
        } else {
            return Err(ctx.reject(kind, format!("unwanted file {path}")));
        }
    }
    Ok(())
}
