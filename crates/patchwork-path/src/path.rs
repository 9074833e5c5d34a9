//! Concrete operation paths
//!
//! Provides [`OperationPath`], the normalized segment list of an address such as
//! `plot.scenarios[2].description`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Normalized address inside a resource document
///
/// Array indices written as `[k]` are folded into plain segments, so
/// `plot.scenarios[2].description` and `plot.scenarios.2.description`
/// address the same location.
///
/// # Examples
/// - `character.name` → `["character", "name"]`
/// - `plot.scenarios[2].description` → `["plot", "scenarios", "2", "description"]`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationPath(Vec<String>);

impl OperationPath {
    /// Parse and normalize a raw path
    ///
    /// # Errors
    /// - `PathError::Empty` for an empty or whitespace-only path
    /// - `PathError::EmptySegment` for `a..b`, a leading/trailing dot, or `[]`
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PathError::Empty);
        }

        let normalized = normalize_indices(raw)?;
        let segments: Vec<String> = normalized
            .split('.')
            .map(|seg| {
                if seg.is_empty() {
                    Err(PathError::EmptySegment(raw.to_string()))
                } else {
                    Ok(seg.to_string())
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }

    /// Create path from already-normalized segments
    #[inline]
    #[must_use]
    pub fn from_segments(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Get path segments
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Get number of segments
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if path has no segments
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Domain root (first segment)
    #[inline]
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Last segment
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Iterator over segments from root to leaf
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// RFC 6901 pointer for the same location (`/plot/scenarios/2`)
    #[must_use]
    pub fn to_pointer(&self) -> String {
        self.0
            .iter()
            .map(|seg| format!("/{}", seg.replace('~', "~0").replace('/', "~1")))
            .collect()
    }
}

/// Fold `[k]` into `.k`
fn normalize_indices(raw: &str) -> Result<String, PathError> {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '[' => {
                let mut inner = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    inner.push(c);
                }
                if !closed {
                    return Err(PathError::UnclosedBracket(raw.to_string()));
                }
                if inner.is_empty() {
                    return Err(PathError::EmptySegment(raw.to_string()));
                }
                out.push('.');
                out.push_str(&inner);
            }
            ']' => return Err(PathError::UnclosedBracket(raw.to_string())),
            other => out.push(other),
        }
    }

    Ok(out)
}

impl Display for OperationPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl FromStr for OperationPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for OperationPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OperationPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Errors related to operation paths
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// Path is empty
    #[error("path is empty")]
    Empty,

    /// Empty segment in path
    #[error("path '{0}' contains an empty segment")]
    EmptySegment(String),

    /// `[` without matching `]` (or the reverse)
    #[error("path '{0}' has an unbalanced index bracket")]
    UnclosedBracket(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dotted() {
        let path = OperationPath::parse("character.name").unwrap();
        assert_eq!(path.segments(), &["character", "name"]);
        assert_eq!(path.root(), Some("character"));
        assert_eq!(path.last(), Some("name"));
    }

    #[test]
    fn parse_folds_indices() {
        let path = OperationPath::parse("plot.scenarios[2].description").unwrap();
        assert_eq!(path.segments(), &["plot", "scenarios", "2", "description"]);
        assert_eq!(path, OperationPath::parse("plot.scenarios.2.description").unwrap());
    }

    #[test]
    fn parse_nested_indices() {
        let path = OperationPath::parse("a[0][1]").unwrap();
        assert_eq!(path.segments(), &["a", "0", "1"]);
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(OperationPath::parse("  "), Err(PathError::Empty));
    }

    #[test]
    fn parse_rejects_empty_segment() {
        assert!(matches!(
            OperationPath::parse("a..b"),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            OperationPath::parse("a.b."),
            Err(PathError::EmptySegment(_))
        ));
        assert!(matches!(
            OperationPath::parse("a[]"),
            Err(PathError::EmptySegment(_))
        ));
    }

    #[test]
    fn parse_rejects_unbalanced() {
        assert!(matches!(
            OperationPath::parse("a[0"),
            Err(PathError::UnclosedBracket(_))
        ));
        assert!(matches!(
            OperationPath::parse("a0]"),
            Err(PathError::UnclosedBracket(_))
        ));
    }

    #[test]
    fn display_uses_dots() {
        let path = OperationPath::parse("flow.nodes[3]").unwrap();
        assert_eq!(path.to_string(), "flow.nodes.3");
    }

    #[test]
    fn pointer_escapes() {
        let path = OperationPath::from_segments(vec!["a/b".into(), "c~d".into()]);
        assert_eq!(path.to_pointer(), "/a~1b/c~0d");
    }
}
