//! Listener registry and change dispatch.

use crate::state::ancestor_prefixes;
use serde_json::Value;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use super::types::{ChangeDetail, ListenerId, Pattern, Tier};

/// Callback signature shared by every tier.
///
/// Exact listeners get `(new_value, detail)`. Wildcard and global listeners
/// get `(detail.value, detail)`.
pub type Handler = dyn Fn(&Value, &Rc<ChangeDetail>);

/// Internal listener state.
struct Listener {
    id: ListenerId,
    handler: Box<Handler>,
    /// Cleared on removal so an in-flight dispatch skips it.
    active: Cell<bool>,
}

type ListenerSet = BTreeMap<ListenerId, Rc<Listener>>;

#[derive(Default)]
struct Registry {
    exact: HashMap<String, ListenerSet>,
    children: HashMap<String, ListenerSet>,
    global: ListenerSet,
    next_id: u64,
    len: usize,
}

impl Registry {
    fn insert(&mut self, pattern: &Pattern, handler: Box<Handler>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        let listener = Rc::new(Listener {
            id,
            handler,
            active: Cell::new(true),
        });

        let set = match pattern {
            Pattern::Exact(path) => self.exact.entry(path.clone()).or_default(),
            Pattern::Children(prefix) => self.children.entry(prefix.clone()).or_default(),
            Pattern::Global => &mut self.global,
        };
        set.insert(id, listener);
        self.len += 1;
        id
    }

    fn remove(&mut self, pattern: &Pattern, id: ListenerId) -> bool {
        let removed = match pattern {
            Pattern::Exact(path) => remove_keyed(&mut self.exact, path, id),
            Pattern::Children(prefix) => remove_keyed(&mut self.children, prefix, id),
            Pattern::Global => self.global.remove(&id),
        };

        match removed {
            Some(listener) => {
                listener.active.set(false);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Cheap interest check used before anything is allocated.
    fn is_interested(&self, path: &str) -> bool {
        if self.len == 0 {
            return false;
        }
        !self.global.is_empty()
            || self.exact.contains_key(path)
            || (!self.children.is_empty()
                && ancestor_prefixes(path).any(|prefix| self.children.contains_key(prefix)))
    }

    /// Listeners interested in `path`, in dispatch order.
    fn collect(&self, path: &str) -> Vec<Rc<Listener>> {
        let mut out = Vec::new();
        if let Some(set) = self.exact.get(path) {
            out.extend(set.values().cloned());
        }
        if !self.children.is_empty() {
            for prefix in ancestor_prefixes(path) {
                if let Some(set) = self.children.get(prefix) {
                    out.extend(set.values().cloned());
                }
            }
        }
        out.extend(self.global.values().cloned());
        out
    }

    fn clear(&mut self) {
        let all = self
            .exact
            .drain()
            .chain(self.children.drain())
            .flat_map(|(_, set)| set.into_values())
            .chain(std::mem::take(&mut self.global).into_values());
        for listener in all {
            listener.active.set(false);
        }
        self.len = 0;
    }
}

/// Remove one listener and drop its key when the set empties.
fn remove_keyed(
    map: &mut HashMap<String, ListenerSet>,
    key: &str,
    id: ListenerId,
) -> Option<Rc<Listener>> {
    let set = map.get_mut(key)?;
    let removed = set.remove(&id);
    if set.is_empty() {
        map.remove(key);
    }
    removed
}

/// Capability returned by `subscribe` that removes exactly one listener.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is a no-op. Dropping
/// the capability leaves the listener registered.
pub struct Unsubscribe {
    registry: Weak<RefCell<Registry>>,
    pattern: Pattern,
    id: ListenerId,
}

impl Unsubscribe {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Remove the listener. Returns whether it was still registered.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.borrow_mut().remove(&self.pattern, self.id);
        if removed {
            tracing::debug!(pattern = %self.pattern, listener = %self.id, "unsubscribed");
        }
        removed
    }
}

impl std::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("pattern", &self.pattern)
            .field("id", &self.id)
            .finish()
    }
}

/// Dispatch counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Change details allocated (one per notified write).
    pub details_built: u64,
    /// Handler invocations.
    pub dispatches: u64,
    /// Handlers that panicked.
    pub handler_failures: u64,
}

/// Holds listeners for all three tiers and dispatches changes to them.
///
/// The registry is never borrowed while user handlers run, so handlers may
/// subscribe, unsubscribe or write back into the store.
pub struct SubscriptionManager {
    registry: Rc<RefCell<Registry>>,
    stats: Cell<DispatchStats>,
    catch_panics: bool,
}

impl SubscriptionManager {
    /// Create a manager that isolates handler panics.
    pub fn new() -> Self {
        Self::with_panic_isolation(true)
    }

    /// Create a manager, choosing whether handler panics are caught.
    pub fn with_panic_isolation(catch_panics: bool) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry::default())),
            stats: Cell::new(DispatchStats::default()),
            catch_panics,
        }
    }

    /// Register a listener.
    pub fn subscribe<F>(&self, pattern: Pattern, handler: F) -> Unsubscribe
    where
        F: Fn(&Value, &Rc<ChangeDetail>) + 'static,
    {
        let id = self.registry.borrow_mut().insert(&pattern, Box::new(handler));
        tracing::debug!(pattern = %pattern, tier = ?pattern.tier(), listener = %id, "subscribed");

        Unsubscribe {
            registry: Rc::downgrade(&self.registry),
            pattern,
            id,
        }
    }

    /// Number of registered listeners across all tiers.
    pub fn listener_count(&self) -> usize {
        self.registry.borrow().len
    }

    /// Number of listeners registered in one tier.
    pub fn tier_count(&self, tier: Tier) -> usize {
        let registry = self.registry.borrow();
        match tier {
            Tier::Exact => registry.exact.values().map(BTreeMap::len).sum(),
            Tier::Children => registry.children.values().map(BTreeMap::len).sum(),
            Tier::Global => registry.global.len(),
        }
    }

    /// Whether any listener would receive a write to `path`.
    pub fn is_interested(&self, path: &str) -> bool {
        self.registry.borrow().is_interested(path)
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats.get()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.registry.borrow_mut().clear();
    }

    /// Notify listeners of a committed write.
    ///
    /// Returns without allocating when no listener is interested in `path`.
    pub fn notify(&self, path: &str, old_value: Option<Value>, value: Value) {
        if !self.is_interested(path) {
            return;
        }
        self.notify_interested(path, old_value, value);
    }

    /// Notify listeners of a write already known to have an audience.
    ///
    /// Skips the interest check. Callers must have seen
    /// [`is_interested`](Self::is_interested) return `true` with no
    /// registry change since.
    pub fn notify_interested(&self, path: &str, old_value: Option<Value>, value: Value) {
        let listeners = self.registry.borrow().collect(path);

        let detail = Rc::new(ChangeDetail {
            path: path.to_string(),
            value,
            old_value,
        });
        self.bump(|s| s.details_built += 1);

        for listener in listeners {
            if !listener.active.get() {
                continue;
            }
            self.invoke(&listener, &detail);
        }
    }

    fn invoke(&self, listener: &Listener, detail: &Rc<ChangeDetail>) {
        self.bump(|s| s.dispatches += 1);

        if !self.catch_panics {
            (listener.handler)(&detail.value, detail);
            return;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (listener.handler)(&detail.value, detail)
        }));
        if let Err(payload) = outcome {
            self.bump(|s| s.handler_failures += 1);
            tracing::error!(
                path = %detail.path,
                listener = %listener.id,
                panic = panic_message(payload.as_ref()),
                "handler panicked"
            );
        }
    }

    fn bump(&self, f: impl FnOnce(&mut DispatchStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Log = Rc<RefCell<Vec<String>>>;

    fn recorder(log: &Log, name: &'static str) -> impl Fn(&Value, &Rc<ChangeDetail>) + 'static {
        let log = log.clone();
        move |_: &Value, detail: &Rc<ChangeDetail>| {
            log.borrow_mut().push(format!("{}:{}", name, detail.path))
        }
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let manager = SubscriptionManager::new();

        let handle = manager.subscribe(Pattern::parse("count").unwrap(), |_, _| {});
        assert_eq!(manager.listener_count(), 1);

        assert!(handle.unsubscribe());
        assert_eq!(manager.listener_count(), 0);

        // Second call is a no-op
        assert!(!handle.unsubscribe());
        assert_eq!(manager.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_removes_only_one() {
        let manager = SubscriptionManager::new();
        let log: Log = Rc::default();

        let first = manager.subscribe(Pattern::parse("x").unwrap(), recorder(&log, "first"));
        let _second = manager.subscribe(Pattern::parse("x").unwrap(), recorder(&log, "second"));

        first.unsubscribe();
        manager.notify("x", None, json!(1));

        assert_eq!(*log.borrow(), vec!["second:x"]);
    }

    #[test]
    fn test_tier_order() {
        let manager = SubscriptionManager::new();
        let log: Log = Rc::default();

        manager.subscribe(Pattern::Global, recorder(&log, "global"));
        manager.subscribe(Pattern::parse("a.*").unwrap(), recorder(&log, "a"));
        manager.subscribe(Pattern::parse("a.b.*").unwrap(), recorder(&log, "a.b"));
        manager.subscribe(Pattern::parse("a.b.c").unwrap(), recorder(&log, "exact"));

        manager.notify("a.b.c", None, json!(1));

        assert_eq!(
            *log.borrow(),
            vec!["exact:a.b.c", "a.b:a.b.c", "a:a.b.c", "global:a.b.c"]
        );
    }

    #[test]
    fn test_registration_order_within_tier() {
        let manager = SubscriptionManager::new();
        let log: Log = Rc::default();

        for name in ["one", "two", "three"] {
            manager.subscribe(Pattern::parse("x").unwrap(), recorder(&log, name));
        }
        manager.notify("x", None, json!(1));

        assert_eq!(*log.borrow(), vec!["one:x", "two:x", "three:x"]);
    }

    #[test]
    fn test_fast_path_builds_no_detail() {
        let manager = SubscriptionManager::new();

        manager.notify("a", None, json!(1));
        manager.subscribe(Pattern::parse("b").unwrap(), |_, _| {});
        manager.subscribe(Pattern::parse("c.*").unwrap(), |_, _| {});
        manager.notify("a", None, json!(2));
        manager.notify("c", None, json!(2));

        assert_eq!(manager.stats().details_built, 0);
        assert_eq!(manager.stats().dispatches, 0);
    }

    #[test]
    fn test_shared_detail() {
        let manager = SubscriptionManager::new();
        let seen: Rc<RefCell<Vec<Rc<ChangeDetail>>>> = Rc::default();

        for pattern in ["user.name", "user.*", "*"] {
            let seen = seen.clone();
            manager.subscribe(
                Pattern::parse(pattern).unwrap(),
                move |_, detail| seen.borrow_mut().push(detail.clone()),
            );
        }
        manager.notify("user.name", Some(json!("Alice")), json!("Bob"));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(Rc::ptr_eq(&seen[0], &seen[1]));
        assert!(Rc::ptr_eq(&seen[0], &seen[2]));
        assert_eq!(seen[0].old_value, Some(json!("Alice")));
        assert_eq!(manager.stats().details_built, 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let manager = SubscriptionManager::new();
        let log: Log = Rc::default();

        manager.subscribe(Pattern::parse("x").unwrap(), |_, _| panic!("boom"));
        manager.subscribe(Pattern::parse("x").unwrap(), recorder(&log, "after"));

        manager.notify("x", None, json!(1));

        assert_eq!(*log.borrow(), vec!["after:x"]);
        assert_eq!(manager.stats().handler_failures, 1);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let manager = SubscriptionManager::new();
        let log: Log = Rc::default();
        let victim: Rc<RefCell<Option<Unsubscribe>>> = Rc::default();

        let victim_clone = victim.clone();
        manager.subscribe(
            Pattern::parse("x").unwrap(),
            move |_, _| {
                if let Some(handle) = victim_clone.borrow().as_ref() {
                    handle.unsubscribe();
                }
            },
        );
        *victim.borrow_mut() = Some(manager.subscribe(Pattern::Global, recorder(&log, "victim")));

        manager.notify("x", None, json!(1));

        assert!(log.borrow().is_empty());
        assert_eq!(manager.listener_count(), 1);
    }

    #[test]
    fn test_notify_interested_dispatches_once() {
        let manager = SubscriptionManager::new();
        let log: Log = Rc::default();

        manager.subscribe(Pattern::parse("a.*").unwrap(), recorder(&log, "children"));
        manager.subscribe(Pattern::Global, recorder(&log, "global"));

        assert!(manager.is_interested("a.b"));
        manager.notify_interested("a.b", None, json!(1));

        assert_eq!(*log.borrow(), vec!["children:a.b", "global:a.b"]);
        assert_eq!(manager.stats().details_built, 1);
        assert_eq!(manager.stats().dispatches, 2);
    }

    #[test]
    fn test_clear() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(Pattern::parse("a.*").unwrap(), |_, _| {});
        manager.subscribe(Pattern::Global, |_, _| {});

        manager.clear();
        assert_eq!(manager.listener_count(), 0);
        assert!(!manager.is_interested("a.b"));
        assert!(!handle.unsubscribe());
    }
}
