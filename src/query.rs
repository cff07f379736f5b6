//! Query-style wrapper over the store's async primitives.
//!
//! A query key `K` maps onto the conventional sub-paths `K.status`,
//! `K.data` and `K.error`. The client adds no state of its own; it only
//! forwards to [`Store::set_async`], [`Store::subscribe`], [`Store::get`]
//! and [`Store::cancel`].

use crate::error::Result;
use crate::operations::{AsyncStatus, CancelSignal, DATA_FIELD, ERROR_FIELD, STATUS_FIELD};
use crate::state::join_path;
use crate::store::Store;
use crate::subscriptions::Unsubscribe;
use serde_json::Value;
use std::fmt;
use std::future::Future;

/// Query client bound to one store.
#[derive(Clone, Debug)]
pub struct QueryClient {
    store: Store,
}

impl QueryClient {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run `fetcher` for `key`, superseding any query already in flight.
    pub fn query<F, Fut, T, E>(&self, key: &str, fetcher: F) -> impl Future<Output = Result<Value>>
    where
        F: FnOnce(CancelSignal) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        T: Into<Value>,
        E: fmt::Display,
    {
        self.store.set_async(key, fetcher)
    }

    /// Call `cb` with each new value of `key.data`.
    pub fn subscribe(&self, key: &str, cb: impl Fn(&Value) + 'static) -> Result<Unsubscribe> {
        self.store
            .subscribe(&join_path(key, DATA_FIELD), move |value, _| cb(value))
    }

    /// Call `cb` with each new status of `key`. Cleared statuses arrive as `None`.
    pub fn subscribe_to_status(
        &self,
        key: &str,
        cb: impl Fn(Option<AsyncStatus>) + 'static,
    ) -> Result<Unsubscribe> {
        self.store.subscribe(&join_path(key, STATUS_FIELD), move |value, _| {
            cb(AsyncStatus::from_value(value))
        })
    }

    /// Call `cb` with each new value of `key.error`.
    pub fn subscribe_to_error(&self, key: &str, cb: impl Fn(&Value) + 'static) -> Result<Unsubscribe> {
        self.store
            .subscribe(&join_path(key, ERROR_FIELD), move |value, _| cb(value))
    }

    pub fn get_data(&self, key: &str) -> Result<Option<Value>> {
        self.store.get(&join_path(key, DATA_FIELD))
    }

    pub fn get_status(&self, key: &str) -> Result<Option<AsyncStatus>> {
        Ok(self
            .store
            .get(&join_path(key, STATUS_FIELD))?
            .as_ref()
            .and_then(AsyncStatus::from_value))
    }

    /// The error message of the last failed query, if it has not been cleared.
    pub fn get_error(&self, key: &str) -> Result<Option<Value>> {
        Ok(self
            .store
            .get(&join_path(key, ERROR_FIELD))?
            .filter(|error| !error.is_null()))
    }

    pub fn cancel(&self, key: &str) -> Result<()> {
        self.store.cancel(key)
    }

    /// Cancel any query for `key` and clear its status, data and error.
    pub fn invalidate(&self, key: &str) -> Result<()> {
        self.store.cancel(key)?;
        self.store.set_many([
            (join_path(key, STATUS_FIELD), Value::Null),
            (join_path(key, DATA_FIELD), Value::Null),
            (join_path(key, ERROR_FIELD), Value::Null),
        ])
    }
}
