//! Main Store handle tying all components together.

use crate::batch::BatchCoordinator;
use crate::error::{Result, StoreError};
use crate::operations::{
    AsyncStatus, CancelSignal, OperationId, OperationManager, DATA_FIELD, ERROR_FIELD,
    STATUS_FIELD,
};
use crate::state::{join_path, AncestorPolicy, Lookup, Path, StateTree};
use crate::subscriptions::{ChangeDetail, Pattern, SubscriptionManager, Tier, Unsubscribe};
use crate::types::{Lifecycle, StoreStats};
use futures::future::{Abortable, Aborted};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

/// Store configuration.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Initial tree. Moved into the store, never shared with the caller.
    pub initial: Value,

    /// What a write does when an ancestor on its path is a leaf.
    pub ancestor_policy: AncestorPolicy,

    /// Catch handler panics so the remaining handlers still run.
    /// When false, a panic propagates out of the write that triggered it.
    pub catch_handler_panics: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial: Value::Object(Map::new()),
            ancestor_policy: AncestorPolicy::Overwrite,
            catch_handler_panics: true,
        }
    }
}

struct StoreInner {
    lifecycle: Cell<Lifecycle>,
    tree: RefCell<StateTree>,
    subscriptions: SubscriptionManager,
    batch: BatchCoordinator,
    operations: OperationManager,
    writes: Cell<u64>,
}

/// The reactive state store.
///
/// `Store` is a cheap handle: clones share the same tree, listeners and
/// operations. It is single-threaded (`!Send`); async operations run on a
/// local executor.
///
/// Provides a unified interface for:
/// - Reading and writing values by dot-separated path
/// - Subscribing to exact paths, children of a prefix, or everything
/// - Batching writes so each path notifies once
/// - Loading values asynchronously with supersession and cancellation
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

impl Store {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a store seeded with `initial`.
    pub fn with_initial(initial: Value) -> Self {
        Self::with_config(StoreConfig {
            initial,
            ..Default::default()
        })
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let StoreConfig {
            initial,
            ancestor_policy,
            catch_handler_panics,
        } = config;

        Self {
            inner: Rc::new(StoreInner {
                lifecycle: Cell::new(Lifecycle::Active),
                tree: RefCell::new(StateTree::new(initial, ancestor_policy)),
                subscriptions: SubscriptionManager::with_panic_isolation(catch_handler_panics),
                batch: BatchCoordinator::new(),
                operations: OperationManager::new(),
                writes: Cell::new(0),
            }),
        }
    }

    // --- Lifecycle ---

    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.lifecycle() == Lifecycle::Destroyed
    }

    fn ensure_active(&self) -> Result<()> {
        match self.lifecycle() {
            Lifecycle::Active => Ok(()),
            Lifecycle::Destroyed => Err(StoreError::Destroyed),
        }
    }

    /// Tear the store down.
    ///
    /// Cancels every async operation, drops all listeners and pending batch
    /// entries, and empties the tree. Every later operation fails with
    /// `StoreError::Destroyed`. Calling this twice is a no-op.
    pub fn destroy(&self) {
        if self.inner.lifecycle.replace(Lifecycle::Destroyed) == Lifecycle::Destroyed {
            return;
        }

        let cancelled = self.inner.operations.cancel_all();
        self.inner.subscriptions.clear();
        self.inner.batch.clear();
        self.inner.tree.borrow_mut().clear();

        tracing::debug!(cancelled, "store destroyed");
    }

    // --- Reads ---

    /// Value at `path`, or the whole tree for `""`.
    ///
    /// Missing paths read as `None`, never as an error.
    pub fn get(&self, path: &str) -> Result<Option<Value>> {
        self.ensure_active()?;
        Ok(self.inner.tree.borrow().get(&Path::parse(path)).cloned())
    }

    /// Read and deserialize the value at `path`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.get(path)?
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    /// Inspect `path` without cloning.
    ///
    /// The tree stays borrowed while `f` runs, so `f` must not write to
    /// the store.
    pub fn read<R>(&self, path: &str, f: impl FnOnce(Lookup<'_>) -> R) -> Result<R> {
        self.ensure_active()?;
        let tree = self.inner.tree.borrow();
        let result = f(tree.lookup(&Path::parse(path)));
        Ok(result)
    }

    // --- Writes ---

    /// Write `value` at `path` and notify listeners.
    ///
    /// Missing intermediate objects are created. Outside a batch every
    /// interested listener has run by the time this returns.
    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<Value> {
        self.ensure_active()?;
        let value = value.into();
        self.write(path, value.clone())?;
        Ok(value)
    }

    /// Serialize `value` and write it at `path`.
    pub fn set_as<T: Serialize>(&self, path: &str, value: &T) -> Result<Value> {
        let value = serde_json::to_value(value)?;
        self.set(path, value)
    }

    /// Write several paths as one batch.
    ///
    /// Accepts anything that yields `(path, value)` pairs: arrays and vecs
    /// of tuples, `HashMap`, `BTreeMap` or a `serde_json::Map`.
    pub fn set_many<I, K, V>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.batch(|| {
            entries
                .into_iter()
                .try_for_each(|(path, value)| self.write(path.as_ref(), value.into()))
        })?
    }

    /// Run `f` with notifications deferred.
    ///
    /// Batches nest. When the outermost one closes, every path written
    /// anywhere inside it notifies once, with the value from before the
    /// batch as `old_value` and the final value as `value`.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> Result<T> {
        self.ensure_active()?;
        let subscriptions = &self.inner.subscriptions;
        Ok(self.inner.batch.run(f, |change| {
            subscriptions.notify(&change.path, change.old_value, change.value)
        }))
    }

    pub fn is_batching(&self) -> bool {
        self.inner.batch.is_batching()
    }

    /// Commit a write and route it to the batch or to listeners.
    fn write(&self, path: &str, value: Value) -> Result<()> {
        let inner = &self.inner;
        let parsed = Path::parse(path);

        if inner.batch.is_batching() {
            let old_value = inner.tree.borrow_mut().set(&parsed, value.clone())?;
            self.count_write();
            tracing::trace!(path, batched = true, depth = inner.batch.depth(), "write");
            inner.batch.record(path, old_value, value);
            return Ok(());
        }

        if !inner.subscriptions.is_interested(path) {
            inner.tree.borrow_mut().set(&parsed, value)?;
            self.count_write();
            tracing::trace!(path, "write");
            return Ok(());
        }

        let old_value = inner.tree.borrow_mut().set(&parsed, value.clone())?;
        self.count_write();
        tracing::trace!(path, "write");
        inner.subscriptions.notify_interested(path, old_value, value);
        Ok(())
    }

    fn count_write(&self) {
        self.inner.writes.set(self.inner.writes.get() + 1);
    }

    // --- Subscriptions ---

    /// Listen for writes.
    ///
    /// - `"*"`: every write
    /// - `"user.*"`: writes anywhere below `user`
    /// - anything else: writes to exactly that path
    ///
    /// Exact listeners receive `(new_value, detail)`; wildcard and global
    /// listeners receive `(detail.value, detail)`. Every listener reached
    /// by one write shares the same `Rc<ChangeDetail>`.
    pub fn subscribe<F>(&self, pattern: &str, handler: F) -> Result<Unsubscribe>
    where
        F: Fn(&Value, &Rc<ChangeDetail>) + 'static,
    {
        self.ensure_active()?;
        let pattern = Pattern::parse(pattern)?;
        Ok(self.inner.subscriptions.subscribe(pattern, handler))
    }

    pub fn listener_count(&self) -> usize {
        self.inner.subscriptions.listener_count()
    }

    pub fn tier_count(&self, tier: Tier) -> usize {
        self.inner.subscriptions.tier_count(tier)
    }

    // --- Async Operations ---

    /// Load a value asynchronously into `path.data`.
    ///
    /// Any operation already running at `path` is cancelled, then
    /// `path.status` is set to `"pending"` and `fetcher` is called, all
    /// before this returns. When the returned future completes:
    /// - success: `path.data`, `path.error = null`, `path.status = "success"`
    /// - failure: `path.data = null`, `path.error`, `path.status = "error"`
    ///
    /// Both are written in one batch, and only if the operation is still the
    /// current one for `path`. The future resolves with the fetcher's own
    /// outcome, or `StoreError::Cancelled` if the operation was cancelled
    /// before the fetcher finished. Dropping the future releases the
    /// operation without writing anything.
    pub fn set_async<F, Fut, T, E>(
        &self,
        path: &str,
        fetcher: F,
    ) -> impl Future<Output = Result<Value>>
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Into<Value>,
        E: fmt::Display,
    {
        let started = self.start_operation(path, fetcher);
        let store = self.clone();
        let path = path.to_string();

        async move {
            let (guard, fetch) = started?;
            let outcome = fetch.await;
            store.complete_operation(&path, guard.id, outcome)
        }
    }

    fn start_operation<F, Fut, T, E>(
        &self,
        path: &str,
        fetcher: F,
    ) -> Result<(OperationGuard, Abortable<Fut>)>
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.ensure_active()?;

        let started = self.inner.operations.start(path);
        let guard = OperationGuard {
            inner: Rc::downgrade(&self.inner),
            path: path.to_string(),
            id: started.id,
        };
        if let Some(previous) = started.superseded {
            tracing::debug!(path, superseded = %previous, by = %started.id, "async operation superseded");
        }
        tracing::debug!(path, id = %started.id, "async operation started");

        self.write(&join_path(path, STATUS_FIELD), AsyncStatus::Pending.into())?;

        let fetch = fetcher(started.signal);
        Ok((guard, Abortable::new(fetch, started.registration)))
    }

    fn complete_operation<T, E>(
        &self,
        path: &str,
        id: OperationId,
        outcome: std::result::Result<std::result::Result<T, E>, Aborted>,
    ) -> Result<Value>
    where
        T: Into<Value>,
        E: fmt::Display,
    {
        let result = match outcome {
            Ok(result) => result.map(Into::into).map_err(|e| e.to_string()),
            Err(Aborted) => {
                tracing::debug!(path, %id, "async operation cancelled before completion");
                return Err(StoreError::Cancelled {
                    path: path.to_string(),
                });
            }
        };

        if !self.inner.operations.finish(path, id) {
            tracing::debug!(path, %id, "discarding stale async result");
            return result.map_err(|message| StoreError::Fetch {
                path: path.to_string(),
                message,
            });
        }

        match result {
            Ok(value) => {
                self.batch(|| -> Result<()> {
                    self.write(&join_path(path, DATA_FIELD), value.clone())?;
                    self.write(&join_path(path, ERROR_FIELD), Value::Null)?;
                    self.write(&join_path(path, STATUS_FIELD), AsyncStatus::Success.into())
                })??;
                Ok(value)
            }
            Err(message) => {
                tracing::warn!(path, %id, error = %message, "async operation failed");
                self.batch(|| -> Result<()> {
                    self.write(&join_path(path, DATA_FIELD), Value::Null)?;
                    self.write(&join_path(path, ERROR_FIELD), Value::String(message.clone()))?;
                    self.write(&join_path(path, STATUS_FIELD), AsyncStatus::Error.into())
                })??;
                Err(StoreError::Fetch {
                    path: path.to_string(),
                    message,
                })
            }
        }
    }

    /// Cancel the async operation at `path`, if any.
    ///
    /// Its result will never be written. `path.status` is left as is.
    pub fn cancel(&self, path: &str) -> Result<()> {
        self.ensure_active()?;
        if let Some(id) = self.inner.operations.cancel(path) {
            tracing::debug!(path, %id, "async operation cancelled");
        }
        Ok(())
    }

    /// Whether an async operation is in flight at `path`.
    pub fn is_loading(&self, path: &str) -> bool {
        self.inner.operations.contains(path)
    }

    pub fn pending_operations(&self) -> usize {
        self.inner.operations.len()
    }

    // --- Stats ---

    pub fn stats(&self) -> StoreStats {
        let dispatch = self.inner.subscriptions.stats();
        StoreStats {
            listeners: self.listener_count(),
            pending_operations: self.pending_operations(),
            writes: self.inner.writes.get(),
            details_built: dispatch.details_built,
            dispatches: dispatch.dispatches,
            handler_failures: dispatch.handler_failures,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("lifecycle", &self.lifecycle())
            .field("listeners", &self.listener_count())
            .field("pending_operations", &self.pending_operations())
            .finish()
    }
}

/// Releases an operation's slot if its future is dropped before completing.
struct OperationGuard {
    inner: Weak<StoreInner>,
    path: String,
    id: OperationId,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if inner.operations.finish(&self.path, self.id) {
            tracing::debug!(path = %self.path, id = %self.id, "async operation dropped before completion");
        }
    }
}
