//! Commit message metadata and the closed set of commit kinds.
//!
//! A commit message is a compact JSON object with a mandatory `type` key.
//! [`CommitKind::classify`] turns it, together with the parent count, into
//! the variant that selects the validation rule.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use convlog_types::ConversationMode;

use crate::error::MessageError;

pub const TYPE_INITIAL: &str = "initial";
pub const TYPE_MEMBER: &str = "member";
pub const TYPE_VOTE: &str = "vote";
pub const TYPE_MERGE: &str = "merge";
pub const TYPE_UPDATE_PROFILE: &str = "application/update-profile";
pub const TYPE_EDITED_MESSAGE: &str = "application/edited-message";
pub const TYPE_TEXT: &str = "text/plain";
pub const TYPE_DATA_TRANSFER: &str = "application/data-transfer+json";

/// Keyed metadata of a commit. Keys serialize in sorted order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommitMessage {
    fields: BTreeMap<String, Value>,
}

impl CommitMessage {
    /// A message with only a `type`.
    pub fn new(message_type: impl Into<String>) -> Self {
        let mut msg = Self::default();
        msg.insert("type", message_type.into());
        msg
    }

    /// A plain-text message.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(TYPE_TEXT).with("body", body.into())
    }

    pub fn parse(raw: &str) -> Result<Self, MessageError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| MessageError::Json(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            _ => Err(MessageError::NotAnObject),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn message_type(&self) -> Option<&str> {
        self.get_str("type")
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Compact JSON encoding, as embedded in the commit.
    pub fn to_json(&self) -> String {
        let map: serde_json::Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::Object(map).to_string()
    }

    fn require_str(&self, key: &'static str) -> Result<String, MessageError> {
        self.get_str(key)
            .map(str::to_string)
            .ok_or(MessageError::MissingKey(key))
    }
}

impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json())
    }
}

/// Action of a `member` commit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberAction {
    Add,
    Join,
    Remove,
    Ban,
    Unban,
    /// An action this version does not know; always rejected.
    Unknown(String),
}

impl MemberAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Add => "add",
            Self::Join => "join",
            Self::Remove => "remove",
            Self::Ban => "ban",
            Self::Unban => "unban",
            Self::Unknown(other) => other,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "add" => Self::Add,
            "join" => Self::Join,
            "remove" => Self::Remove,
            "ban" => Self::Ban,
            "unban" => Self::Unban,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for MemberAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a commit does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitKind {
    /// Root commit: fixes the mode and, for one-to-one, the peer.
    Initial {
        mode: ConversationMode,
        invited: Option<String>,
    },
    Member {
        action: MemberAction,
        uri: String,
    },
    Vote {
        uri: String,
    },
    ProfileUpdate,
    EditedMessage {
        edit: String,
    },
    Merge,
    /// Free-form content (`text/plain`, file transfers, types added later).
    Content {
        content_type: String,
    },
}

impl CommitKind {
    /// Decide the kind of a commit with `parents` parents and message `msg`.
    pub fn classify(parents: usize, msg: &CommitMessage) -> Result<Self, MessageError> {
        match parents {
            0 => {
                let mode = msg
                    .get("mode")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| MessageError::InvalidMode("missing mode".into()))?;
                let mode = ConversationMode::from_code(mode)
                    .map_err(|e| MessageError::InvalidMode(e.to_string()))?;
                let invited = msg
                    .get_str("invited")
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                Ok(Self::Initial { mode, invited })
            }
            1 => {
                let message_type = msg.require_str("type")?;
                match message_type.as_str() {
                    TYPE_MEMBER => Ok(Self::Member {
                        action: MemberAction::parse(&msg.require_str("action")?),
                        uri: msg.require_str("uri")?,
                    }),
                    TYPE_VOTE => Ok(Self::Vote {
                        uri: msg.require_str("uri")?,
                    }),
                    TYPE_UPDATE_PROFILE => Ok(Self::ProfileUpdate),
                    _ if message_type == TYPE_EDITED_MESSAGE || msg.contains("edit") => {
                        Ok(Self::EditedMessage {
                            edit: msg.require_str("edit")?,
                        })
                    }
                    _ => Ok(Self::Content {
                        content_type: message_type,
                    }),
                }
            }
            _ => Ok(Self::Merge),
        }
    }

    /// The minimal message describing this kind.
    pub fn to_message(&self) -> CommitMessage {
        match self {
            Self::Initial { mode, invited } => {
                let mut msg = CommitMessage::new(TYPE_INITIAL).with("mode", mode.code());
                if let Some(invited) = invited {
                    msg.insert("invited", invited.clone());
                }
                msg
            }
            Self::Member { action, uri } => CommitMessage::new(TYPE_MEMBER)
                .with("action", action.as_str())
                .with("uri", uri.clone()),
            Self::Vote { uri } => CommitMessage::new(TYPE_VOTE).with("uri", uri.clone()),
            Self::ProfileUpdate => CommitMessage::new(TYPE_UPDATE_PROFILE),
            Self::EditedMessage { edit } => {
                CommitMessage::new(TYPE_EDITED_MESSAGE).with("edit", edit.clone())
            }
            Self::Merge => CommitMessage::new(TYPE_MERGE),
            Self::Content { content_type } => CommitMessage::new(content_type.clone()),
        }
    }

    pub fn is_membership_change(&self) -> bool {
        matches!(self, Self::Member { .. })
    }
}
