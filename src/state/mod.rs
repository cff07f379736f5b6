//! Path-addressed state tree.
//!
//! Values live in a single `serde_json::Value` root. Paths are parsed into
//! segment sequences and navigation reports a typed [`Lookup`] rather than
//! probing for properties.

mod path;
mod tree;

pub use path::{ancestor_prefixes, join_path, Path, SEPARATOR};
pub use tree::{AncestorPolicy, Lookup, StateTree};
