use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Role of a participant at a given commit.
///
/// Ordered from most to least privileged, so `role <= MemberRole::Member`
/// reads as "at least a member".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
    Invited,
    Banned,
    /// Named in the initial commit but present in no table.
    Left,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Invited => "invited",
            Self::Banned => "banned",
            Self::Left => "left",
        }
    }

    /// Returns `true` if this role grants at least the rights of `required`.
    pub fn satisfies(&self, required: MemberRole) -> bool {
        *self <= required
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "invited" => Ok(Self::Invited),
            "banned" => Ok(Self::Banned),
            "left" => Ok(Self::Left),
            other => Err(TypeError::UnknownRole(other.to_string())),
        }
    }
}

/// A participant of a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    pub uri: String,
    pub role: MemberRole,
}

impl Member {
    pub fn new(uri: impl Into<String>, role: MemberRole) -> Self {
        Self {
            uri: uri.into(),
            role,
        }
    }
}
