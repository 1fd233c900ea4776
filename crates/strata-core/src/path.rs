//! Qualified paths into the model and state trees

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered sequence of field names addressing a node from the root
///
/// Written and displayed as a dot-separated string (`"todos.add"`).
/// The empty path addresses the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path(Vec<String>);

impl Path {
    /// The root path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dot-separated path
    ///
    /// No validation happens here: a malformed path simply never matches a
    /// registered node.
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return Self::root();
        }
        Self(s.split('.').map(str::to_string).collect())
    }

    /// Check if this is the root path
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the path has no segments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments in order
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// A new path with one more segment
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Append another path to this one
    pub fn join(&self, other: &Path) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// The path without its last segment (`None` at the root)
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// The last segment (`None` at the root)
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&Path> for Path {
    fn from(p: &Path) -> Self {
        p.clone()
    }
}

impl From<Vec<String>> for Path {
    fn from(segments: Vec<String>) -> Self {
        Self(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = Path::parse("todos.items.add");
        assert_eq!(path.len(), 3);
        assert_eq!(path.to_string(), "todos.items.add");
        assert_eq!(path.last(), Some("add"));
    }

    #[test]
    fn test_root() {
        let root = Path::parse("");
        assert!(root.is_root());
        assert_eq!(root.parent(), None);
        assert_eq!(root.to_string(), "");
    }

    #[test]
    fn test_parent_and_child() {
        let path = Path::parse("a.b");
        assert_eq!(path.parent(), Some(Path::parse("a")));
        assert_eq!(Path::root().child("a").child("b"), path);
        assert_eq!(Path::parse("a").join(&Path::parse("b.c")), Path::parse("a.b.c"));
    }
}
