//! Managed async loading.
//!
//! An operation at path `P` drives three sub-paths:
//! - `P.status`: `"pending"`, then `"success"` or `"error"`
//! - `P.data`: the fetched value (null after a failure)
//! - `P.error`: the failure message (null after a success)
//!
//! Only one operation per path is live. Starting another cancels the first,
//! and a cancelled or superseded operation never writes its result.

mod manager;
mod types;

pub use manager::{OperationManager, StartedOperation};
pub use types::{AsyncStatus, CancelSignal, OperationId, DATA_FIELD, ERROR_FIELD, STATUS_FIELD};
