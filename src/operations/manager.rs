//! Per-path registry of in-flight async operations.

use futures::future::{AbortHandle, AbortRegistration};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::types::{CancelSignal, OperationId};

/// Internal operation state.
struct OperationRecord {
    id: OperationId,
    handle: AbortHandle,
}

/// A freshly registered operation.
pub struct StartedOperation {
    pub id: OperationId,
    /// Registration for wrapping the fetcher's future in `Abortable`.
    pub registration: AbortRegistration,
    /// Signal handed to the fetcher.
    pub signal: CancelSignal,
    /// The earlier operation on the same path that this one cancelled.
    pub superseded: Option<OperationId>,
}

/// Tracks at most one live operation per path.
pub struct OperationManager {
    operations: RefCell<HashMap<String, OperationRecord>>,
    next_id: Cell<u64>,
}

impl OperationManager {
    pub fn new() -> Self {
        Self {
            operations: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Register a new operation for `path`, cancelling any current one.
    pub fn start(&self, path: &str) -> StartedOperation {
        let id = OperationId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let (handle, registration) = AbortHandle::new_pair();
        let record = OperationRecord {
            id,
            handle: handle.clone(),
        };

        let previous = self.operations.borrow_mut().insert(path.to_string(), record);
        let superseded = previous.map(|prev| {
            prev.handle.abort();
            prev.id
        });

        StartedOperation {
            id,
            registration,
            signal: CancelSignal::new(path.to_string(), id, handle),
            superseded,
        }
    }

    /// Retire a completed operation.
    ///
    /// Returns `true` if it was still current (and is now removed), `false`
    /// if it had already been cancelled or superseded.
    pub fn finish(&self, path: &str, id: OperationId) -> bool {
        let mut operations = self.operations.borrow_mut();
        match operations.get(path) {
            Some(record) if record.id == id => {
                operations.remove(path);
                true
            }
            _ => false,
        }
    }

    /// Cancel the live operation for `path`, if any.
    pub fn cancel(&self, path: &str) -> Option<OperationId> {
        let record = self.operations.borrow_mut().remove(path)?;
        record.handle.abort();
        Some(record.id)
    }

    /// Cancel every live operation. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<OperationRecord> = self
            .operations
            .borrow_mut()
            .drain()
            .map(|(_, record)| record)
            .collect();
        for record in &drained {
            record.handle.abort();
        }
        drained.len()
    }

    /// Whether an operation is in flight for `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.operations.borrow().contains_key(path)
    }

    /// Number of in-flight operations.
    pub fn len(&self) -> usize {
        self.operations.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.borrow().is_empty()
    }
}

impl Default for OperationManager {
    fn default() -> Self {
        Self::new()
    }
}
