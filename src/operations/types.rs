//! Async operation types.

use futures::future::AbortHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Sub-path holding an operation's status string.
pub const STATUS_FIELD: &str = "status";

/// Sub-path holding the fetched value.
pub const DATA_FIELD: &str = "data";

/// Sub-path holding the failure message.
pub const ERROR_FIELD: &str = "error";

/// Status written to `<path>.status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsyncStatus {
    Pending,
    Success,
    Error,
}

impl AsyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AsyncStatus::Pending => "pending",
            AsyncStatus::Success => "success",
            AsyncStatus::Error => "error",
        }
    }

    /// Read a status back out of the tree. Anything unrecognised is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "pending" => Some(AsyncStatus::Pending),
            "success" => Some(AsyncStatus::Success),
            "error" => Some(AsyncStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for AsyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AsyncStatus> for Value {
    fn from(status: AsyncStatus) -> Self {
        Value::String(status.as_str().to_string())
    }
}

/// Identity of one started operation.
///
/// Generations increase monotonically per store, so a completion can tell
/// whether it is still the current operation for its path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cancellation signal handed to a fetcher.
///
/// Fetchers that do blocking-style work between suspension points should
/// poll [`CancelSignal::is_cancelled`]. The fetcher's future is also dropped
/// at its next suspension point once the operation is cancelled.
#[derive(Clone)]
pub struct CancelSignal {
    path: String,
    id: OperationId,
    handle: AbortHandle,
}

impl CancelSignal {
    pub(crate) fn new(path: String, id: OperationId, handle: AbortHandle) -> Self {
        Self { path, id, handle }
    }

    /// Whether the operation was cancelled or superseded.
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_aborted()
    }

    /// Path the operation writes to.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn id(&self) -> OperationId {
        self.id
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("path", &self.path)
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_strings() {
        for status in [AsyncStatus::Pending, AsyncStatus::Success, AsyncStatus::Error] {
            let value = Value::from(status);
            assert_eq!(value, json!(status.as_str()));
            assert_eq!(AsyncStatus::from_value(&value), Some(status));
            assert_eq!(serde_json::to_value(status).unwrap(), value);
        }
    }

    #[test]
    fn test_unknown_status() {
        assert_eq!(AsyncStatus::from_value(&json!("loading")), None);
        assert_eq!(AsyncStatus::from_value(&Value::Null), None);
    }

    #[test]
    fn test_signal_tracks_abort() {
        let (handle, _registration) = AbortHandle::new_pair();
        let signal = CancelSignal::new("user".to_string(), OperationId(1), handle.clone());

        assert!(!signal.is_cancelled());
        handle.abort();
        assert!(signal.is_cancelled());
        assert_eq!(signal.path(), "user");
    }
}
