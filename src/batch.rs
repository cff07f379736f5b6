//! Batch coordination: nesting depth and deduplicated pending writes.
//!
//! While any batch is open, committed writes are recorded here instead of
//! being dispatched. Each path keeps the value it had before its first
//! write in the batch and the latest value written. When the outermost
//! batch closes, every touched path is flushed exactly once, in the order
//! paths were first written.

use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// One deduplicated change waiting for the outermost batch to close.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingChange {
    pub path: String,
    /// Value before the first write inside the batch.
    pub old_value: Option<Value>,
    /// Value after the last write inside the batch.
    pub value: Value,
}

#[derive(Debug, Default)]
struct PendingChanges {
    changes: Vec<PendingChange>,
    /// Path to position in `changes`.
    index: HashMap<String, usize>,
}

/// Tracks batch nesting and the pending-changes map.
#[derive(Debug, Default)]
pub struct BatchCoordinator {
    depth: Cell<u32>,
    pending: RefCell<PendingChanges>,
}

impl BatchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment batch depth, returns new depth.
    pub fn enter(&self) -> u32 {
        let depth = self.depth.get() + 1;
        self.depth.set(depth);
        depth
    }

    /// Decrement batch depth, returns new depth.
    pub fn exit(&self) -> u32 {
        let depth = self.depth.get().saturating_sub(1);
        self.depth.set(depth);
        depth
    }

    pub fn depth(&self) -> u32 {
        self.depth.get()
    }

    pub fn is_batching(&self) -> bool {
        self.depth.get() > 0
    }

    /// Record a committed write made inside a batch.
    ///
    /// The first write to a path keeps `old_value`; later writes only
    /// replace the latest value.
    pub fn record(&self, path: &str, old_value: Option<Value>, value: Value) {
        let mut pending = self.pending.borrow_mut();
        let existing = pending.index.get(path).copied();
        if let Some(pos) = existing {
            pending.changes[pos].value = value;
            return;
        }

        let pos = pending.changes.len();
        pending.index.insert(path.to_string(), pos);
        pending.changes.push(PendingChange {
            path: path.to_string(),
            old_value,
            value,
        });
    }

    /// Drain every pending change in first-write order.
    pub fn take_pending(&self) -> Vec<PendingChange> {
        let mut pending = self.pending.borrow_mut();
        pending.index.clear();
        std::mem::take(&mut pending.changes)
    }

    /// Drop pending changes without flushing them.
    pub fn clear(&self) {
        let mut pending = self.pending.borrow_mut();
        pending.index.clear();
        pending.changes.clear();
    }

    /// Run `f` inside a batch.
    ///
    /// When this call closes the outermost batch, pending changes are
    /// handed to `flush` one at a time. The depth is restored even if `f`
    /// panics; pending changes are then discarded rather than dispatched
    /// mid-unwind.
    pub fn run<T, F>(&self, f: impl FnOnce() -> T, flush: F) -> T
    where
        F: FnMut(PendingChange),
    {
        self.enter();

        struct BatchGuard<'a, F: FnMut(PendingChange)> {
            coordinator: &'a BatchCoordinator,
            flush: F,
        }

        impl<F: FnMut(PendingChange)> Drop for BatchGuard<'_, F> {
            fn drop(&mut self) {
                if self.coordinator.exit() > 0 {
                    return;
                }

                let changes = self.coordinator.take_pending();
                if std::thread::panicking() {
                    tracing::warn!(
                        dropped = changes.len(),
                        "batch closed by panic; pending changes not dispatched"
                    );
                    return;
                }

                tracing::trace!(changes = changes.len(), "flushing batch");
                for change in changes {
                    (self.flush)(change);
                }
            }
        }

        let _guard = BatchGuard {
            coordinator: self,
            flush,
        };
        f()
    }
}
