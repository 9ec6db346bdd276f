//! Per-conversation settings.

use std::path::Path;

use serde::{Deserialize, Serialize};

use convlog_protocol::{MAX_FETCH_SIZE, SIDEBAND_MAX_DATA};
use convlog_sync::{FetchOptions, ServeOptions};
use convlog_types::MemberRole;
use convlog_validator::ValidatorConfig;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// Settings shared by every operation on one conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Least privileged role allowed to change the profile.
    pub update_profile_perm_lvl: MemberRole,
    /// Byte ceiling of one fetched pack.
    pub max_fetch_size: usize,
    /// Payload size of side-band data frames when serving.
    pub sideband_chunk: usize,
    /// Buffered events per subscriber.
    pub event_capacity: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            update_profile_perm_lvl: MemberRole::Admin,
            max_fetch_size: MAX_FETCH_SIZE,
            sideband_chunk: SIDEBAND_MAX_DATA,
            event_capacity: 256,
        }
    }
}

impl ConversationConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validator(&self) -> ValidatorConfig {
        ValidatorConfig {
            update_profile_perm_lvl: self.update_profile_perm_lvl,
        }
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            max_size: self.max_fetch_size,
            want: None,
        }
    }

    pub fn serve_options(&self) -> ServeOptions {
        ServeOptions {
            sideband_chunk: self.sideband_chunk.clamp(1, SIDEBAND_MAX_DATA),
            max_pack_size: self.max_fetch_size,
        }
    }
}
