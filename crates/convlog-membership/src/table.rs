//! The member table at a snapshot.

use std::collections::HashSet;

use convlog_store::Snapshot;
use convlog_types::{ConversationMode, Member, MemberRole, ObjectId};

use crate::paths::{self, ADMINS, BANNED, INVITED, MEMBERS};

/// Directories scanned for members, in priority order.
const ROLE_DIRS: [(&str, MemberRole); 6] = [
    (ADMINS, MemberRole::Admin),
    (MEMBERS, MemberRole::Member),
    (INVITED, MemberRole::Invited),
    ("banned/members", MemberRole::Banned),
    ("banned/admins", MemberRole::Banned),
    ("banned/invited", MemberRole::Banned),
];

/// Every participant recorded in `snap`.
///
/// A uri listed in several directories keeps the role of the first one in
/// priority order. In one-to-one conversations the initial participants
/// missing from every table are reported as [`MemberRole::Left`].
pub fn members_at(snap: &Snapshot, mode: ConversationMode, initial: &[String]) -> Vec<Member> {
    let mut seen = HashSet::new();
    let mut members = Vec::new();
    for (dir, role) in ROLE_DIRS {
        for file in snap.list_dir(dir) {
            let uri = paths::uri_from_file(&file).to_string();
            if seen.insert(uri.clone()) {
                members.push(Member::new(uri, role));
            }
        }
    }
    if mode == ConversationMode::OneToOne {
        for uri in initial {
            if seen.insert(uri.clone()) {
                members.push(Member::new(uri.clone(), MemberRole::Left));
            }
        }
    }
    members
}

/// Role of `uri` in `snap`, ignoring the initial participant list.
pub fn role_of(snap: &Snapshot, uri: &str) -> Option<MemberRole> {
    if snap.contains(&paths::admin_cert(uri)) {
        Some(MemberRole::Admin)
    } else if snap.contains(&paths::member_cert(uri)) {
        Some(MemberRole::Member)
    } else if snap.contains(&paths::invited(uri)) {
        Some(MemberRole::Invited)
    } else if snap.contains(&format!("{BANNED}/members/{uri}.crt"))
        || snap.contains(&format!("{BANNED}/admins/{uri}.crt"))
        || snap.contains(&format!("{BANNED}/invited/{uri}"))
    {
        Some(MemberRole::Banned)
    } else {
        None
    }
}

/// Uris holding an admin certificate.
pub fn admins(snap: &Snapshot) -> Vec<String> {
    snap.list_dir(ADMINS)
        .into_iter()
        .filter(|f| f.ends_with(paths::CERT_EXT))
        .map(|f| paths::uri_from_file(&f).to_string())
        .collect()
}

/// Blob of the account certificate of an active member or admin.
pub fn member_certificate(snap: &Snapshot, uri: &str) -> Option<ObjectId> {
    snap.get(&paths::member_cert(uri))
        .or_else(|| snap.get(&paths::admin_cert(uri)))
        .copied()
}

/// `true` if `uri` has an account certificate anywhere in the tree,
/// including the banned tables.
pub fn has_account_certificate(snap: &Snapshot, uri: &str) -> bool {
    member_certificate(snap, uri).is_some()
        || snap.contains(&format!("{BANNED}/members/{uri}.crt"))
        || snap.contains(&format!("{BANNED}/admins/{uri}.crt"))
}
