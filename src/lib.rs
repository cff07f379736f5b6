//! # dotstore
//!
//! A reactive state store: one tree of values addressed by dot-separated
//! paths, with change notification, batched writes and managed async
//! loading.
//!
//! ## Core Concepts
//!
//! - **Paths**: `"user.profile.name"` addresses nested objects; missing
//!   intermediate objects are created on write
//! - **Subscriptions**: exact (`user.name`), children (`user.*`) and
//!   global (`*`) listeners sharing one change detail per write
//! - **Batches**: nested scopes that notify once per touched path
//! - **Async operations**: `status`/`data`/`error` sub-paths driven by a
//!   fetcher, with supersession and cancellation
//!
//! ## Example
//!
//! ```
//! use dotstore::Store;
//! use serde_json::json;
//!
//! let store = Store::with_initial(json!({"count": 0, "user": {"name": "Alice"}}));
//!
//! let unsubscribe = store.subscribe("user.*", |value, detail| {
//!     println!("{} changed to {}", detail.path, value);
//! })?;
//!
//! store.set("user.name", "Bob")?;
//! store.batch(|| {
//!     store.set("count", 1)?;
//!     store.set("count", 2)
//! })??;
//!
//! assert_eq!(store.get("count")?, Some(json!(2)));
//! unsubscribe.unsubscribe();
//! store.destroy();
//! # Ok::<(), dotstore::StoreError>(())
//! ```

pub mod batch;
pub mod error;
pub mod operations;
pub mod query;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use batch::{BatchCoordinator, PendingChange};
pub use error::{Result, StoreError};
pub use operations::{
    AsyncStatus, CancelSignal, OperationId, OperationManager, DATA_FIELD, ERROR_FIELD,
    STATUS_FIELD,
};
pub use query::QueryClient;
pub use state::{AncestorPolicy, Lookup, Path, StateTree};
pub use store::{Store, StoreConfig};
pub use subscriptions::{
    ChangeDetail, DispatchStats, ListenerId, Pattern, SubscriptionManager, Tier, Unsubscribe,
    GLOBAL_PATTERN,
};
pub use types::*;
