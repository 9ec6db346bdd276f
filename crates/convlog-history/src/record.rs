use convlog_types::ObjectId;
use convlog_validator::CommitMessage;

/// A commit as shown to callers.
#[derive(Clone, Debug, PartialEq)]
pub struct CommitRecord {
    pub id: ObjectId,
    pub parents: Vec<ObjectId>,
    /// The commit shown right after this one; `None` at the end of the walk
    /// or when the walk was asked to skip the annotation.
    pub linearized_parent: Option<ObjectId>,
    pub author_device: String,
    /// Owner of the author device, when it can be resolved.
    pub author_uri: Option<String>,
    pub timestamp: i64,
    pub message: CommitMessage,
}

impl CommitRecord {
    pub fn message_type(&self) -> Option<&str> {
        self.message.message_type()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Text searched by a pattern: the body of plain text, the display name
    /// of everything else.
    pub fn searchable_text(&self) -> Option<&str> {
        match self.message_type() {
            Some("text/plain") => self.message.get_str("body"),
            _ => self.message.get_str("displayName"),
        }
    }
}
