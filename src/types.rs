//! Core types for the state store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store lifecycle. `Destroyed` is terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    Destroyed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Active => f.write_str("active"),
            Lifecycle::Destroyed => f.write_str("destroyed"),
        }
    }
}

/// Store statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Registered listeners across all tiers.
    pub listeners: usize,
    /// In-flight async operations.
    pub pending_operations: usize,
    /// Committed writes (batched or not).
    pub writes: u64,
    /// Change details allocated. Stays flat while nobody listens.
    pub details_built: u64,
    /// Handler invocations.
    pub dispatches: u64,
    /// Handler invocations that panicked.
    pub handler_failures: u64,
}
