//! Dot-separated path parsing.

use std::fmt;

/// Segment separator.
pub const SEPARATOR: char = '.';

/// A parsed state path.
///
/// `"user.profile.name"` parses into three segments. The empty string
/// parses into the root path with no segments. Segments are taken
/// verbatim: `"a..b"` has an empty middle segment, and numeric segments
/// are ordinary object keys.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path (the whole tree).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dot-separated path string.
    ///
    /// ```
    /// use dotstore::Path;
    ///
    /// let path = Path::parse("user.name");
    /// assert_eq!(path.len(), 2);
    /// assert!(Path::parse("").is_root());
    /// ```
    pub fn parse(s: &str) -> Self {
        if s.is_empty() {
            return Self::root();
        }
        Self {
            segments: s.split(SEPARATOR).map(str::to_string).collect(),
        }
    }

    /// Build a path from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether this path addresses the whole tree.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The first `len` segments as a path.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            segments: self.segments[..len.min(self.segments.len())].to_vec(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

/// Join a raw path string and a child segment.
///
/// The root path joins to the bare segment.
pub fn join_path(base: &str, segment: &str) -> String {
    if base.is_empty() {
        segment.to_string()
    } else {
        format!("{}{}{}", base, SEPARATOR, segment)
    }
}

/// Proper ancestor prefixes of a raw path string, nearest first.
///
/// `"a.b.c"` yields `"a.b"` then `"a"`. Borrows from the input so the
/// dispatch fast path can probe listener keys without allocating.
pub fn ancestor_prefixes(path: &str) -> impl Iterator<Item = &str> {
    let mut rest = path;
    std::iter::from_fn(move || {
        let idx = rest.rfind(SEPARATOR)?;
        rest = &rest[..idx];
        Some(rest)
    })
}
