use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Join policy of a conversation, fixed by its initial commit.
///
/// The integer code is what travels in the initial commit's `mode` key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConversationMode {
    /// Exactly two participants named at creation.
    OneToOne,
    /// Only admins may invite.
    AdminInvitesOnly,
    /// Any member may invite.
    InvitesOnly,
    /// Anyone may join.
    Public,
}

impl ConversationMode {
    /// Wire code stored in the initial commit.
    pub fn code(&self) -> i64 {
        match self {
            Self::OneToOne => 0,
            Self::AdminInvitesOnly => 1,
            Self::InvitesOnly => 2,
            Self::Public => 3,
        }
    }

    /// Parse a wire code.
    pub fn from_code(code: i64) -> Result<Self, TypeError> {
        match code {
            0 => Ok(Self::OneToOne),
            1 => Ok(Self::AdminInvitesOnly),
            2 => Ok(Self::InvitesOnly),
            3 => Ok(Self::Public),
            other => Err(TypeError::UnknownMode(other)),
        }
    }
}

impl fmt::Display for ConversationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OneToOne => "one-to-one",
            Self::AdminInvitesOnly => "admin-invites-only",
            Self::InvitesOnly => "invites-only",
            Self::Public => "public",
        };
        f.write_str(s)
    }
}
