//! The mutable state tree and path navigation.

use super::path::Path;
use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What happens when a write must descend through an existing leaf.
///
/// An array is a leaf to any segment that is not an index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AncestorPolicy {
    /// Replace the leaf with a fresh object and keep going.
    #[default]
    Overwrite,
    /// Fail the write with `StoreError::NotAContainer`.
    Reject,
}

/// Typed result of navigating to a path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Lookup<'a> {
    /// An object that paths can descend into.
    Container(&'a Map<String, Value>),
    /// Any other value, arrays included.
    Leaf(&'a Value),
    /// Some segment along the way does not exist.
    Absent,
}

impl<'a> Lookup<'a> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }
}

/// Root container holding all store values.
#[derive(Clone, Debug)]
pub struct StateTree {
    root: Value,
    policy: AncestorPolicy,
}

impl StateTree {
    /// Create a tree from an initial value.
    pub fn new(initial: Value, policy: AncestorPolicy) -> Self {
        Self {
            root: initial,
            policy,
        }
    }

    /// Value at `path`, or `None` if any segment is missing.
    ///
    /// Inside an array a segment must be a canonical decimal index.
    pub fn get(&self, path: &Path) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.segments() {
            node = match node {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(parse_index(segment)?)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Navigate to `path` and classify what is there.
    pub fn lookup(&self, path: &Path) -> Lookup<'_> {
        match self.get(path) {
            Some(Value::Object(map)) => Lookup::Container(map),
            Some(value) => Lookup::Leaf(value),
            None => Lookup::Absent,
        }
    }

    /// Assign `value` at `path`, creating missing intermediate objects.
    ///
    /// Index segments address array elements in place. An index equal to
    /// the array's length appends; a larger one fails with
    /// `StoreError::IndexOutOfBounds` and leaves the tree unchanged.
    ///
    /// Returns the value previously stored at `path`.
    pub fn set(&mut self, path: &Path, value: Value) -> Result<Option<Value>> {
        let Some((last, parents)) = path.segments().split_last() else {
            return Ok(Some(std::mem::replace(&mut self.root, value)));
        };

        let policy = self.policy;
        let mut node = &mut self.root;
        for (depth, segment) in parents.iter().enumerate() {
            let at = || path.prefix(depth);
            let index = array_index(node, segment);
            node = match (node, index) {
                (Value::Array(items), Some(index)) => element_slot(items, index, at)?,
                (node, _) => ensure_object(node, policy, at)?
                    .entry(segment.as_str())
                    .or_insert(Value::Null),
            };
        }

        let at = || path.prefix(parents.len());
        let index = array_index(node, last);
        match (node, index) {
            (Value::Array(items), Some(index)) => assign_element(items, index, value, at),
            (node, _) => Ok(ensure_object(node, policy, at)?.insert(last.clone(), value)),
        }
    }

    /// Replace the whole tree with an empty object.
    pub fn clear(&mut self) {
        self.root = Value::Object(Map::new());
    }
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()), AncestorPolicy::default())
    }
}

/// Parse an array index segment: ASCII digits with no leading zero.
fn parse_index(segment: &str) -> Option<usize> {
    let canonical = !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'));
    if canonical {
        segment.parse().ok()
    } else {
        None
    }
}

/// The index `segment` names if `node` is an array.
fn array_index(node: &Value, segment: &str) -> Option<usize> {
    if node.is_array() {
        parse_index(segment)
    } else {
        None
    }
}

fn out_of_bounds(at: impl Fn() -> Path, index: usize, len: usize) -> StoreError {
    StoreError::IndexOutOfBounds {
        path: at().to_string(),
        index,
        len,
    }
}

/// Element `index` of `items` for descending into, appending a null slot
/// when `index` is one past the end.
fn element_slot<'a>(
    items: &'a mut Vec<Value>,
    index: usize,
    at: impl Fn() -> Path,
) -> Result<&'a mut Value> {
    let len = items.len();
    if index > len {
        return Err(out_of_bounds(at, index, len));
    }
    if index == len {
        items.push(Value::Null);
    }
    Ok(&mut items[index])
}

/// Store `value` at element `index`, returning the element it replaced.
fn assign_element(
    items: &mut Vec<Value>,
    index: usize,
    value: Value,
    at: impl Fn() -> Path,
) -> Result<Option<Value>> {
    let len = items.len();
    if index < len {
        Ok(Some(std::mem::replace(&mut items[index], value)))
    } else if index == len {
        items.push(value);
        Ok(None)
    } else {
        Err(out_of_bounds(at, index, len))
    }
}

/// Make `node` an object so a child can be written into it.
///
/// Null counts as absent and is always replaced.
fn ensure_object<'a>(
    node: &'a mut Value,
    policy: AncestorPolicy,
    at: impl Fn() -> Path,
) -> Result<&'a mut Map<String, Value>> {
    if !node.is_object() {
        if !node.is_null() && policy == AncestorPolicy::Reject {
            return Err(StoreError::NotAContainer {
                path: at().to_string(),
            });
        }
        *node = Value::Object(Map::new());
    }
    node.as_object_mut().ok_or_else(|| StoreError::NotAContainer {
        path: at().to_string(),
    })
}
