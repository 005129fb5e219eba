//! Resource identifiers (spec §3) — `scheme://authority/path?query#fragment`.
//!
//! This is deliberately minimal: full RFC 3986 transformation is out of
//! scope for the VFS core (spec §1), which only needs enough of a URI to
//! dispatch on scheme and compare/canonicalize paths.

use std::fmt;
use std::str::FromStr;

/// A parsed resource identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    pub scheme: String,
    pub authority: String,
    pub path: String,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

/// Error returned when a string is not a well-formed `scheme://...` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUri(pub String);

impl fmt::Display for InvalidUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid URI: {}", self.0)
    }
}

impl std::error::Error for InvalidUri {}

impl Resource {
    /// Build a resource with an empty authority, for providers that ignore it.
    pub fn new(scheme: impl Into<String>, path: impl Into<String>) -> Self {
        Self { scheme: scheme.into(), authority: String::new(), path: path.into(), query: None, fragment: None }
    }

    /// True if `path` is rooted at `/`.
    pub fn has_absolute_path(&self) -> bool {
        self.path.starts_with('/')
    }

    /// Return a resource identical to `self` but with a different path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self { path: path.into(), ..self.clone() }
    }

    /// `dirname` of the path component, following POSIX rules (no trailing slash kept).
    pub fn parent(&self) -> Self {
        let trimmed = self.path.trim_end_matches('/');
        let parent_path = match trimmed.rfind('/') {
            Some(0) => "/".to_string(),
            Some(idx) => trimmed[..idx].to_string(),
            None => "/".to_string(),
        };
        self.with_path(parent_path)
    }

    /// `basename` of the path component.
    pub fn basename(&self) -> String {
        let trimmed = self.path.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(idx) => trimmed[idx + 1..].to_string(),
            None => trimmed.to_string(),
        }
    }

    /// Join a child name onto this resource's path.
    pub fn join(&self, name: &str) -> Self {
        let base = self.path.trim_end_matches('/');
        let path = if base.is_empty() { format!("/{name}") } else { format!("{base}/{name}") };
        self.with_path(path)
    }

    /// True if `self` is `other` or a descendant of `other` by path.
    pub fn is_at_or_beneath(&self, other: &Resource) -> bool {
        if self.scheme != other.scheme || self.authority != other.authority {
            return false;
        }
        let a = self.path.trim_end_matches('/');
        let b = other.path.trim_end_matches('/');
        a == b || a.starts_with(&format!("{b}/"))
    }

    /// The human-readable form required by spec §7 (fsPath for `file`, else the URI string).
    pub fn display_form(&self) -> String {
        if self.scheme == "file" {
            self.path.clone()
        } else {
            self.to_string()
        }
    }

    /// Canonical resource key (spec §3): the string form, lowercased iff the
    /// provider lacks `PathCaseSensitive`.
    pub fn canonical_key(&self, case_sensitive: bool) -> String {
        let s = self.to_string();
        if case_sensitive { s } else { s.to_lowercase() }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.path)?;
        if let Some(q) = &self.query {
            write!(f, "?{q}")?;
        }
        if let Some(frag) = &self.fragment {
            write!(f, "#{frag}")?;
        }
        Ok(())
    }
}

impl FromStr for Resource {
    type Err = InvalidUri;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s.split_once("://").ok_or_else(|| InvalidUri(s.to_string()))?;
        if scheme.is_empty() {
            return Err(InvalidUri(s.to_string()));
        }
        let (rest, fragment) = match rest.split_once('#') {
            Some((a, b)) => (a, Some(b.to_string())),
            None => (rest, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((a, b)) => (a, Some(b.to_string())),
            None => (rest, None),
        };
        let (authority, path) = match rest.find('/') {
            Some(idx) => (rest[..idx].to_string(), rest[idx..].to_string()),
            None => (rest.to_string(), String::new()),
        };
        Ok(Resource { scheme: scheme.to_string(), authority, path, query, fragment })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_uri() {
        let r: Resource = "mem://host/a/b.txt".parse().unwrap();
        assert_eq!(r.scheme, "mem");
        assert_eq!(r.authority, "host");
        assert_eq!(r.path, "/a/b.txt");
    }

    #[test]
    fn roundtrips_display() {
        let r: Resource = "mem://host/a/b.txt?q=1#frag".parse().unwrap();
        assert_eq!(r.to_string(), "mem://host/a/b.txt?q=1#frag");
    }

    #[test]
    fn parent_and_basename() {
        let r: Resource = "mem:///a/b/c.txt".parse().unwrap();
        assert_eq!(r.basename(), "c.txt");
        assert_eq!(r.parent().path, "/a/b");
        assert_eq!(r.parent().parent().path, "/a");
        assert_eq!(r.parent().parent().parent().path, "/");
    }

    #[test]
    fn descendant_check() {
        let root: Resource = "mem:///a".parse().unwrap();
        let child: Resource = "mem:///a/b".parse().unwrap();
        let sibling: Resource = "mem:///ab".parse().unwrap();
        assert!(child.is_at_or_beneath(&root));
        assert!(root.is_at_or_beneath(&root));
        assert!(!sibling.is_at_or_beneath(&root));
    }

    #[test]
    fn canonical_key_case() {
        let r: Resource = "mem:///A/B".parse().unwrap();
        assert_eq!(r.canonical_key(true), "mem:///A/B");
        assert_eq!(r.canonical_key(false), "mem:///a/b");
    }
}
