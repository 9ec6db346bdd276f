use convlog_types::ObjectId;

use crate::record::CommitRecord;

/// Search criteria. Every set field must match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    /// Author uri.
    pub author: Option<String>,
    /// Stop the walk after this commit.
    pub last_id: Option<ObjectId>,
    /// Substring of the body (plain text) or display name (other types).
    pub pattern: Option<String>,
    pub case_sensitive: bool,
    /// Exact message type, e.g. `text/plain`.
    pub content_type: Option<String>,
    /// Inclusive lower bound on the commit timestamp.
    pub after: Option<i64>,
    /// Inclusive upper bound on the commit timestamp.
    pub before: Option<i64>,
    /// Stop once this many records matched.
    pub max_result: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &CommitRecord) -> bool {
        if let Some(author) = &self.author {
            if record.author_uri.as_deref() != Some(author.as_str()) {
                return false;
            }
        }
        if let Some(content_type) = &self.content_type {
            if record.message_type() != Some(content_type.as_str()) {
                return false;
            }
        }
        if self.after.is_some_and(|after| record.timestamp < after)
            || self.before.is_some_and(|before| record.timestamp > before)
        {
            return false;
        }
        match &self.pattern {
            None => true,
            Some(pattern) => record
                .searchable_text()
                .is_some_and(|text| self.contains(text, pattern)),
        }
    }

    fn contains(&self, text: &str, pattern: &str) -> bool {
        if self.case_sensitive {
            text.contains(pattern)
        } else {
            text.to_lowercase().contains(&pattern.to_lowercase())
        }
    }

    /// `true` once `found` matches are enough.
    pub fn is_full(&self, found: usize) -> bool {
        self.max_result.is_some_and(|max| found >= max)
    }
}
