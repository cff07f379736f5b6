//! Change subscriptions for the state tree.
//!
//! Listeners come in three tiers:
//! - Exact: `user.name` fires on writes to that path
//! - Children: `user.*` fires on writes anywhere below `user`
//! - Global: `*` fires on every write
//!
//! A write that nobody listens to takes a fast path: no detail is built and
//! no listener set is copied. Otherwise one [`ChangeDetail`] is allocated
//! and shared by every listener, dispatched exact first, then children
//! (nearest prefix first), then global.
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new();
//!
//! let handle = manager.subscribe(
//!     Pattern::parse("user.*")?,
//!     |value, detail| println!("{} = {}", detail.path, value),
//! );
//!
//! manager.notify("user.name", Some(json!("Alice")), json!("Bob"));
//! handle.unsubscribe();
//! ```

mod manager;
mod types;

pub use manager::{DispatchStats, Handler, SubscriptionManager, Unsubscribe};
pub use types::{ChangeDetail, ListenerId, Pattern, Tier, GLOBAL_PATTERN};
