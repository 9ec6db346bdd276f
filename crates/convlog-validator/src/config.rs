use serde::{Deserialize, Serialize};

use convlog_types::MemberRole;

/// Policy knobs of the rule engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Least privileged role allowed to change `profile.vcf`.
    pub update_profile_perm_lvl: MemberRole,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            update_profile_perm_lvl: MemberRole::Admin,
        }
    }
}

impl ValidatorConfig {
    /// Any member may update the profile.
    pub fn permissive() -> Self {
        Self {
            update_profile_perm_lvl: MemberRole::Member,
        }
    }
}
