//! Subscription types for change notification.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Pattern that subscribes to every write.
pub const GLOBAL_PATTERN: &str = "*";

/// Suffix marking a direct-children subscription (`user.*`).
const CHILDREN_SUFFIX: &str = ".*";

/// A parsed subscription pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// Writes to exactly this path.
    Exact(String),
    /// Writes anywhere below this prefix.
    Children(String),
    /// Every write.
    Global,
}

impl Pattern {
    /// Parse a subscription pattern.
    ///
    /// `*` is global, a trailing `.*` subscribes below the prefix, and
    /// anything else is taken literally.
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern == GLOBAL_PATTERN {
            return Ok(Pattern::Global);
        }
        match pattern.strip_suffix(CHILDREN_SUFFIX) {
            Some("") => Err(StoreError::InvalidPattern(pattern.to_string())),
            Some(prefix) => Ok(Pattern::Children(prefix.to_string())),
            None => Ok(Pattern::Exact(pattern.to_string())),
        }
    }

    pub fn tier(&self) -> Tier {
        match self {
            Pattern::Exact(_) => Tier::Exact,
            Pattern::Children(_) => Tier::Children,
            Pattern::Global => Tier::Global,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(path) => f.write_str(path),
            Pattern::Children(prefix) => write!(f, "{}{}", prefix, CHILDREN_SUFFIX),
            Pattern::Global => f.write_str(GLOBAL_PATTERN),
        }
    }
}

/// Listener tier, in dispatch order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Exact,
    Children,
    Global,
}

/// One committed mutation.
///
/// A single instance is built per notified write and the same `Rc` is
/// handed to every listener it reaches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeDetail {
    /// Full path that was written.
    pub path: String,
    /// Value after the write.
    pub value: Value,
    /// Value before the write (`None` if the path did not exist).
    pub old_value: Option<Value>,
}

/// Unique identifier for a listener registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
