//! Moderation ballots: vote markers, quorum, and resolution.
//!
//! A vote is an empty file at `votes/<direction>/<kind>/<target>/<voter>`.
//! Once more than half of the current admins have voted, the target's file
//! moves between its normal directory and `banned/<kind>/`.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use convlog_store::{ObjectStore, Snapshot};
use convlog_types::MemberRole;

use crate::devices::devices_of;
use crate::error::{MembershipError, MembershipResult};
use crate::paths::{BANNED, CERT_EXT, VOTES};
use crate::table::admins;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VoteDirection {
    Ban,
    Unban,
}

impl VoteDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Unban => "unban",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteDirection {
    type Err = MembershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ban" => Ok(Self::Ban),
            "unban" => Ok(Self::Unban),
            other => Err(MembershipError::UnknownDirection(other.to_string())),
        }
    }
}

/// What a ballot targets: a directory of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Members,
    Admins,
    Devices,
    Invited,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Members => "members",
            Self::Admins => "admins",
            Self::Devices => "devices",
            Self::Invited => "invited",
        }
    }

    /// File name of `target` inside the kind's directory.
    pub fn file_name(&self, target: &str) -> String {
        match self {
            Self::Invited => target.to_string(),
            _ => format!("{target}{CERT_EXT}"),
        }
    }

    /// Where the target lives while not banned.
    pub fn active_path(&self, target: &str) -> String {
        format!("{}/{}", self.as_str(), self.file_name(target))
    }

    /// Where the target lives while banned.
    pub fn banned_path(&self, target: &str) -> String {
        format!("{BANNED}/{}/{}", self.as_str(), self.file_name(target))
    }

    /// Role restored by an unban.
    pub fn restored_role(&self) -> MemberRole {
        match self {
            Self::Admins => MemberRole::Admin,
            Self::Invited => MemberRole::Invited,
            Self::Members | Self::Devices => MemberRole::Member,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetKind {
    type Err = MembershipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "members" => Ok(Self::Members),
            "admins" => Ok(Self::Admins),
            "devices" => Ok(Self::Devices),
            "invited" => Ok(Self::Invited),
            other => Err(MembershipError::UnknownTargetKind(other.to_string())),
        }
    }
}

/// A parsed vote marker path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VotePath {
    pub direction: VoteDirection,
    pub kind: TargetKind,
    pub target: String,
    pub voter: String,
}

impl VotePath {
    pub fn new(
        direction: VoteDirection,
        kind: TargetKind,
        target: impl Into<String>,
        voter: impl Into<String>,
    ) -> Self {
        Self {
            direction,
            kind,
            target: target.into(),
            voter: voter.into(),
        }
    }

    /// Directory holding every ballot for this target and direction.
    pub fn ballot_dir(direction: VoteDirection, kind: TargetKind, target: &str) -> String {
        format!("{VOTES}/{direction}/{kind}/{target}")
    }

    pub fn to_path(&self) -> String {
        format!(
            "{}/{}",
            Self::ballot_dir(self.direction, self.kind, &self.target),
            self.voter
        )
    }
}

/// Parse `votes/<direction>/<kind>/<target>/<voter>`.
pub fn parse_vote_path(path: &str) -> Option<VotePath> {
    let mut parts = path.split('/');
    if parts.next()? != VOTES {
        return None;
    }
    let direction = parts.next()?.parse().ok()?;
    let kind = parts.next()?.parse().ok()?;
    let target = parts.next().filter(|s| !s.is_empty())?;
    let voter = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some(VotePath::new(direction, kind, target, voter))
}

/// Ballots cast by current admins against the number of admins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tally {
    pub votes: usize,
    pub admins: usize,
}

impl Tally {
    /// Strict majority: `votes / admins > 0.5`.
    pub fn reached(&self) -> bool {
        self.admins > 0 && self.votes * 2 > self.admins
    }
}

/// Count admin ballots for `target` in `snap`.
pub fn tally(snap: &Snapshot, direction: VoteDirection, kind: TargetKind, target: &str) -> Tally {
    let admin_uris = admins(snap);
    let votes = admin_uris
        .iter()
        .filter(|admin| {
            let ballot = VotePath::new(direction, kind, target, admin.as_str());
            snap.contains(&ballot.to_path())
        })
        .count();
    Tally {
        votes,
        admins: admin_uris.len(),
    }
}

/// Apply a resolved ballot to `snap`.
///
/// Removes every marker for the target and direction, then moves the
/// target's file. A ban of an account also removes every device it issued.
/// Returns the removed device ids.
pub fn apply_resolution(
    store: &dyn ObjectStore,
    snap: &mut Snapshot,
    direction: VoteDirection,
    kind: TargetKind,
    target: &str,
) -> MembershipResult<Vec<String>> {
    snap.remove_under(&format!("{}/", VotePath::ballot_dir(direction, kind, target)));

    let (from, to) = match direction {
        VoteDirection::Ban => (kind.active_path(target), kind.banned_path(target)),
        VoteDirection::Unban => (kind.banned_path(target), kind.active_path(target)),
    };
    let blob = snap
        .remove(&from)
        .ok_or_else(|| MembershipError::MissingFile(from.clone()))?;
    snap.insert(to, blob)?;

    let mut removed = Vec::new();
    if direction == VoteDirection::Ban && kind != TargetKind::Devices {
        for device in devices_of(store, snap, target)? {
            snap.remove(&crate::paths::device_cert(&device));
            removed.push(device);
        }
    }
    debug!(%direction, %kind, uri = target, removed = removed.len(), "applied vote resolution");
    Ok(removed)
}
