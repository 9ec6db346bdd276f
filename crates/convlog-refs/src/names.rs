//! Ref name validation.
//!
//! Branch names follow git-style conventions. Remote names are peer device
//! ids, so they are restricted to a single ASCII identifier.

use crate::error::{RefError, RefResult};

/// Characters that are forbidden anywhere in a branch name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a branch name.
///
/// ```
/// use convlog_refs::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> RefResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "must not be empty"));
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(invalid(name, format!("contains forbidden character {ch:?}")));
    }
    if name.contains("..") || name.contains("@{") {
        return Err(invalid(name, "must not contain '..' or '@{'"));
    }
    if name.ends_with(".lock") || name.ends_with('.') || name.ends_with('/') {
        return Err(invalid(name, "bad suffix"));
    }
    if name.split('/').any(|c| c.is_empty() || c.starts_with('.')) {
        return Err(invalid(name, "empty or hidden path component"));
    }
    Ok(())
}

/// Validate a remote (peer device) name.
pub fn validate_remote_name(name: &str) -> RefResult<()> {
    if name.is_empty() {
        return Err(invalid(name, "remote name must not be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(invalid(name, "remote name must be an ASCII identifier"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_git_style_branches() {
        assert!(validate_branch_name("main").is_ok());
        assert!(validate_branch_name("feature/auth").is_ok());
        assert!(validate_branch_name("v1.0").is_ok());
    }

    #[test]
    fn rejects_bad_branches() {
        for bad in ["", "a..b", "has space", "a:b", "ref@{0}", "main.lock", "/x", "x/", "a//b", ".hidden", "a/.b"] {
            assert!(validate_branch_name(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn remote_names_are_device_ids() {
        assert!(validate_remote_name("3f2a9c0d11").is_ok());
        assert!(validate_remote_name("peer_1").is_ok());
        assert!(validate_remote_name("").is_err());
        assert!(validate_remote_name("a/b").is_err());
        assert!(validate_remote_name("a b").is_err());
    }
}
