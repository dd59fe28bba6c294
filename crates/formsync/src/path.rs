//! Tree addresses and field references
//!
//! Provides [`TreePath`] for addressing nodes in the data tree, plus the
//! mapping from tree addresses to human-facing field references.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Address of a node in the data tree
///
/// Rendered as a JSON pointer with a leading slash.
///
/// # Examples
/// - `["a", "0", "b"]` → `/a/0/b`
/// - `[]` → `` (the root)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TreePath(Vec<String>);

impl TreePath {
    /// Create new path from steps
    #[inline]
    #[must_use]
    pub fn new(steps: Vec<String>) -> Self {
        Self(steps)
    }

    /// Empty path (root)
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Get path steps
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.0
    }

    /// Get number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if path is the root
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Get parent path (if not root)
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Get last step (if not root)
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Last step read as a list index
    #[inline]
    #[must_use]
    pub fn last_index(&self) -> Option<usize> {
        self.last().filter(|s| is_int(s)).and_then(|s| s.parse().ok())
    }

    /// Append a step, returning new path
    #[inline]
    #[must_use]
    pub fn child(&self, step: impl Into<String>) -> Self {
        let mut new = self.clone();
        new.0.push(step.into());
        new
    }

    /// Append every step of a relative path
    #[inline]
    #[must_use]
    pub fn join(&self, relative: &TreePath) -> Self {
        let mut new = self.clone();
        new.0.extend(relative.0.iter().cloned());
        new
    }

    /// Check if this path is a prefix of another
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0 == other.0[..self.0.len()]
    }

    /// Iterator over steps from root to leaf
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Human-facing field reference
    ///
    /// Numeric steps collapse into a `[]` marker on the preceding step and
    /// the rest is joined with `.`: `/a/0/b` → `a[].b`.
    #[must_use]
    pub fn fieldref(&self) -> String {
        let mut result: Vec<String> = Vec::with_capacity(self.0.len());
        for step in &self.0 {
            if is_int(step) {
                match result.last_mut() {
                    Some(last) => last.push_str("[]"),
                    None => result.push("[]".to_string()),
                }
            } else {
                result.push(step.clone());
            }
        }
        result.join(".")
    }
}

fn escape(step: &str) -> String {
    step.replace('~', "~0").replace('/', "~1")
}

fn unescape(step: &str) -> Result<String, PathError> {
    let mut out = String::with_capacity(step.len());
    let mut chars = step.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return Err(PathError::InvalidEscape(step.to_string())),
        }
    }
    Ok(out)
}

impl Display for TreePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            write!(f, "/{}", escape(step))?;
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = PathError;

    /// Parse a slash-separated address; the leading slash is optional
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix('/').unwrap_or(s);
        if s.is_empty() {
            return Ok(Self::root());
        }
        let steps = s.split('/').map(unescape).collect::<Result<_, _>>()?;
        Ok(Self(steps))
    }
}

impl From<Vec<String>> for TreePath {
    fn from(steps: Vec<String>) -> Self {
        Self(steps)
    }
}

/// Errors related to tree paths
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// `~` not followed by `0` or `1`
    #[error("invalid escape in path step: {0}")]
    InvalidEscape(String),
}

/// Split an address into its steps (no unescaping)
#[must_use]
pub fn path_to_steps(path: &str) -> Vec<String> {
    let path = path.strip_prefix('/').unwrap_or(path);
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/').map(str::to_string).collect()
}

/// Join steps into an address with a leading slash
#[must_use]
pub fn steps_to_path<S: AsRef<str>>(steps: &[S]) -> String {
    let joined = steps
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/");
    if joined.starts_with('/') {
        joined
    } else {
        format!("/{joined}")
    }
}

/// Check if a step addresses a list entry
#[inline]
#[must_use]
pub fn is_int(step: &str) -> bool {
    !step.is_empty() && step.bytes().all(|b| b.is_ascii_digit())
}

/// Canonical form of an address (`a/b` → `/a/b`); unparsable input is kept
pub(crate) fn normalize(path: &str) -> String {
    path.parse::<TreePath>()
        .map(|p| p.to_string())
        .unwrap_or_else(|_| path.to_string())
}

/// Convert a tree address to a field reference (`/a/0/b` → `a[].b`)
#[must_use]
pub fn path_to_fieldref(path: &str) -> String {
    TreePath::new(path_to_steps(path)).fieldref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn path_root() {
        let path = TreePath::root();
        assert!(path.is_root());
        assert_eq!(path.to_string(), "");
        assert_eq!(TreePath::from_str("/").unwrap(), path);
        assert_eq!(TreePath::from_str("").unwrap(), path);
    }

    #[test]
    fn path_parent_and_child() {
        let path: TreePath = "/a/0/b".parse().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.parent().unwrap().to_string(), "/a/0");
        assert_eq!(path.parent().unwrap().last_index(), Some(0));
        assert_eq!(path.child("c").to_string(), "/a/0/b/c");
        assert!(TreePath::root().parent().is_none());
    }

    #[test]
    fn path_prefix() {
        let a: TreePath = "/a".parse().unwrap();
        let b: TreePath = "/a/1".parse().unwrap();
        assert!(a.is_prefix_of(&b));
        assert!(!b.is_prefix_of(&a));
        assert!(TreePath::root().is_prefix_of(&a));
    }

    #[test]
    fn path_join() {
        let base: TreePath = "/items/2".parse().unwrap();
        let rel: TreePath = "name".parse().unwrap();
        assert_eq!(base.join(&rel).to_string(), "/items/2/name");
    }

    #[test]
    fn path_escaping() {
        let path = TreePath::new(vec!["a/b".into(), "c~d".into()]);
        assert_eq!(path.to_string(), "/a~1b/c~0d");
        assert_eq!(TreePath::from_str("/a~1b/c~0d").unwrap(), path);
        assert!(matches!(
            TreePath::from_str("/a~2"),
            Err(PathError::InvalidEscape(_))
        ));
    }

    #[test]
    fn steps_conversion() {
        assert_eq!(path_to_steps("/a/b"), vec!["a", "b"]);
        assert_eq!(path_to_steps("a/b"), vec!["a", "b"]);
        assert!(path_to_steps("/").is_empty());
        assert_eq!(steps_to_path(&["a", "b"]), "/a/b");
        assert_eq!(steps_to_path::<&str>(&[]), "/");
    }

    #[test]
    fn int_detection() {
        assert!(is_int("0"));
        assert!(is_int("12"));
        assert!(!is_int(""));
        assert!(!is_int("a1"));
        assert!(!is_int("-1"));
    }

    #[test]
    fn normalized_addresses() {
        assert_eq!(normalize("a/b"), "/a/b");
        assert_eq!(normalize("/a/b"), "/a/b");
        assert_eq!(normalize("/"), "");
    }

    #[test]
    fn fieldref_collapses_indexes() {
        assert_eq!(path_to_fieldref("/a/0/b"), "a[].b");
        assert_eq!(path_to_fieldref("/a/b"), "a.b");
        assert_eq!(path_to_fieldref("/a/0/b/12/c"), "a[].b[].c");
        assert_eq!(path_to_fieldref("/foo"), "foo");
        assert_eq!(path_to_fieldref("/0"), "[]");
    }

    proptest! {
        #[test]
        fn display_parse_round_trip(steps in proptest::collection::vec("[a-z0-9~/]{1,6}", 0..5)) {
            let path = TreePath::new(steps);
            let parsed: TreePath = path.to_string().parse().unwrap();
            prop_assert_eq!(parsed, path);
        }

        #[test]
        fn fieldref_never_contains_digits_only_segments(
            steps in proptest::collection::vec(prop_oneof!["[a-z]{1,4}", "[0-9]{1,3}"], 1..6)
        ) {
            let fieldref = TreePath::new(steps).fieldref();
            for part in fieldref.split('.') {
                prop_assert!(!is_int(part));
            }
        }
    }
}
