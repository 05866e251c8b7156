//! Validated names that cross the service boundary.
//!
//! Every string a client supplies as a username, tag label, or notebook path
//! is parsed into one of these types before it reaches a store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest tag label accepted.
pub const MAX_LABEL_LEN: usize = 63;

/// Longest username accepted.
pub const MAX_USERNAME_LEN: usize = 128;

/// Longest workspace-relative path accepted.
pub const MAX_PATH_LEN: usize = 256;

/// Prefix the notebook front-end puts in front of workspace paths.
const API_PREFIX: &str = "/notebooks/";

/// Rejected input for one of the validated name types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("username must not be empty")]
    EmptyUsername,

    #[error("invalid username '{0}': use letters, digits, '.', '_', '@' or '-' (max 128)")]
    InvalidUsername(String),

    #[error("tag label must not be empty")]
    EmptyLabel,

    #[error("invalid tag label '{0}': use letters, digits or '-' (max 63)")]
    InvalidLabel(String),

    #[error("notebook path must not be empty")]
    EmptyPath,

    #[error("invalid notebook path '{0}'")]
    InvalidPath(String),

    #[error("invalid quality '{0}': expected Development, Beta or Release")]
    InvalidQuality(String),
}

// ============================================================================
// Username
// ============================================================================

/// A platform username, trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let name = raw.trim().to_lowercase();
        if name.is_empty() {
            return Err(ValueError::EmptyUsername);
        }
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._@-".contains(c));
        let dots_only = name.chars().all(|c| c == '.');
        if !valid_chars || dots_only || name.len() > MAX_USERNAME_LEN {
            return Err(ValueError::InvalidUsername(raw.trim().to_string()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

// ============================================================================
// Tag labels
// ============================================================================

/// A tag label: lowercase ASCII letters, digits and hyphens.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagLabel(String);

impl TagLabel {
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let label = raw.trim().to_lowercase();
        if label.is_empty() {
            return Err(ValueError::EmptyLabel);
        }
        let valid_chars = label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_chars || label.len() > MAX_LABEL_LEN {
            return Err(ValueError::InvalidLabel(raw.trim().to_string()));
        }
        Ok(Self(label))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TagLabel {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TagLabel> for String {
    fn from(value: TagLabel) -> Self {
        value.0
    }
}

/// Parse a tag list given either as separate items or comma-separated text.
///
/// Blank items are skipped and duplicates collapse, first occurrence wins.
pub fn parse_label_list<'a, I>(items: I) -> Result<Vec<TagLabel>, ValueError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut labels: Vec<TagLabel> = Vec::new();
    for item in items {
        for piece in item.split(',') {
            if piece.trim().is_empty() {
                continue;
            }
            let label = TagLabel::parse(piece)?;
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
    }
    Ok(labels)
}

// ============================================================================
// Notebook paths
// ============================================================================

/// A path relative to a user's workspace root, e.g. `projects/demo.ipynb`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NotebookPath(String);

impl NotebookPath {
    /// Parse a workspace path, stripping the front-end `/notebooks/` prefix.
    pub fn parse(raw: &str) -> Result<Self, ValueError> {
        let trimmed = raw.trim();
        let stripped = trimmed.strip_prefix(API_PREFIX).unwrap_or(trimmed);
        let path = stripped.trim_matches('/');
        if path.is_empty() {
            return Err(ValueError::EmptyPath);
        }
        let bad_segment = path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
        if bad_segment || path.contains('\0') || path.len() > MAX_PATH_LEN {
            return Err(ValueError::InvalidPath(trimmed.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    /// Parse a destination directory, where an empty string means "not given".
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, ValueError> {
        match Self::parse(raw) {
            Ok(path) => Ok(Some(path)),
            Err(ValueError::EmptyPath) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Split an owner-qualified key such as `alice/proj.ipynb`.
    pub fn split_qualified(raw: &str) -> Result<(Username, Self), ValueError> {
        let path = Self::parse(raw)?;
        match path.0.split_once('/') {
            Some((owner, rest)) => Ok((Username::parse(owner)?, Self::parse(rest)?)),
            None => Err(ValueError::InvalidPath(raw.trim().to_string())),
        }
    }

    /// The owner-qualified key of this path.
    pub fn qualified(&self, owner: &Username) -> String {
        format!("{}/{}", owner, self.0)
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotebookPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NotebookPath {
    type Error = ValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NotebookPath> for String {
    fn from(value: NotebookPath) -> Self {
        value.0
    }
}

// ============================================================================
// Slugs
// ============================================================================

/// Filesystem-safe directory name derived from a display name.
///
/// Runs of anything other than ASCII letters and digits become `_`; a slug
/// that would end in `_` gets `project` appended.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_gap = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            in_gap = false;
        } else if !in_gap {
            slug.push('_');
            in_gap = true;
        }
    }
    if slug.is_empty() || slug.ends_with('_') {
        slug.push_str("project");
    }
    slug
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_normalizes() {
        let user = Username::parse("  Alice ").unwrap();
        assert_eq!(user.as_str(), "alice");
        assert!(Username::parse("jane.doe@example.org").is_ok());
    }

    #[test]
    fn test_username_rejects_bad_input() {
        assert_eq!(Username::parse("   "), Err(ValueError::EmptyUsername));
        assert!(matches!(
            Username::parse("bob smith"),
            Err(ValueError::InvalidUsername(_))
        ));
        assert!(Username::parse(&"a".repeat(129)).is_err());
        assert!(Username::parse("..").is_err());
    }

    #[test]
    fn test_label_charset() {
        assert_eq!(TagLabel::parse("Curated").unwrap().as_str(), "curated");
        assert!(TagLabel::parse("gene-expression2").is_ok());
        assert!(matches!(
            TagLabel::parse("no spaces"),
            Err(ValueError::InvalidLabel(_))
        ));
        assert!(TagLabel::parse("under_score").is_err());
        assert_eq!(TagLabel::parse(""), Err(ValueError::EmptyLabel));
    }

    #[test]
    fn test_label_length_limit() {
        assert!(TagLabel::parse(&"x".repeat(63)).is_ok());
        assert!(TagLabel::parse(&"x".repeat(64)).is_err());
    }

    #[test]
    fn test_label_list_accepts_csv_and_dedupes() {
        let labels = parse_label_list(["rna-seq, featured", "Featured", " ", "variant"]).unwrap();
        let labels: Vec<&str> = labels.iter().map(TagLabel::as_str).collect();
        assert_eq!(labels, vec!["rna-seq", "featured", "variant"]);
    }

    #[test]
    fn test_label_list_reports_first_bad_label() {
        let err = parse_label_list(["ok,not ok"]).unwrap_err();
        assert_eq!(err, ValueError::InvalidLabel("not ok".into()));
    }

    #[test]
    fn test_path_strips_api_prefix() {
        let path = NotebookPath::parse("/notebooks/projects/demo.ipynb").unwrap();
        assert_eq!(path.as_str(), "projects/demo.ipynb");
        assert_eq!(path.file_name(), "demo.ipynb");
    }

    #[test]
    fn test_path_rejects_traversal() {
        assert!(NotebookPath::parse("../etc/passwd").is_err());
        assert!(NotebookPath::parse("a//b.ipynb").is_err());
        assert!(NotebookPath::parse("a/./b.ipynb").is_err());
        assert_eq!(NotebookPath::parse("/"), Err(ValueError::EmptyPath));
    }

    #[test]
    fn test_optional_destination() {
        assert_eq!(NotebookPath::parse_optional("").unwrap(), None);
        assert_eq!(
            NotebookPath::parse_optional("copies/").unwrap().unwrap().as_str(),
            "copies"
        );
        assert!(NotebookPath::parse_optional("..").is_err());
    }

    #[test]
    fn test_split_qualified() {
        let (owner, path) = NotebookPath::split_qualified("alice/proj.ipynb").unwrap();
        assert_eq!(owner.as_str(), "alice");
        assert_eq!(path.as_str(), "proj.ipynb");
        assert_eq!(path.qualified(&owner), "alice/proj.ipynb");
        assert!(NotebookPath::split_qualified("proj.ipynb").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Demo"), "demo");
        assert_eq!(slugify("RNA-Seq Analysis v2"), "rna_seq_analysis_v2");
        assert_eq!(slugify("Hello, World!"), "hello_world_project");
        assert_eq!(slugify("???"), "_project");
        assert_eq!(slugify(""), "project");
    }
}
