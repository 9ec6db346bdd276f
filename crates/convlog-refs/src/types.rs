use serde::{Deserialize, Serialize};
use convlog_types::ObjectId;

/// The branch every conversation commits to.
pub const MAIN_BRANCH: &str = "main";

/// Canonical name of a local branch ref.
pub fn branch_ref_name(branch: &str) -> String {
    format!("refs/heads/{branch}")
}

/// Canonical name of a remote tracking ref.
pub fn remote_ref_name(remote: &str, branch: &str) -> String {
    format!("refs/remotes/{remote}/{branch}")
}

/// A named pointer to a commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ref {
    /// A local branch.
    Branch { name: String, target: ObjectId },
    /// The last validated tip of a branch on a peer device.
    Remote {
        remote: String,
        branch: String,
        target: ObjectId,
    },
}

impl Ref {
    pub fn branch(name: impl Into<String>, target: ObjectId) -> Self {
        Self::Branch {
            name: name.into(),
            target,
        }
    }

    pub fn remote(remote: impl Into<String>, branch: impl Into<String>, target: ObjectId) -> Self {
        Self::Remote {
            remote: remote.into(),
            branch: branch.into(),
            target,
        }
    }

    pub fn target(&self) -> ObjectId {
        match self {
            Self::Branch { target, .. } | Self::Remote { target, .. } => *target,
        }
    }

    /// Canonical ref name for this ref.
    pub fn canonical_name(&self) -> String {
        match self {
            Self::Branch { name, .. } => branch_ref_name(name),
            Self::Remote { remote, branch, .. } => remote_ref_name(remote, branch),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}
