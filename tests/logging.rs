//! Structured log events emitted by the store.

use dotstore::Store;
use futures::channel::oneshot;
use futures::executor::block_on;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

#[derive(Clone, Debug)]
struct CapturedEvent {
    level: Level,
    fields: HashMap<String, String>,
}

impl CapturedEvent {
    fn message(&self) -> &str {
        self.fields.get("message").map(String::as_str).unwrap_or_default()
    }
}

#[derive(Default)]
struct FieldVisitor {
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), value.to_string());
    }
}

#[derive(Clone, Default)]
struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CaptureLayer {
    fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn find(&self, level: Level, message: &str) -> Option<CapturedEvent> {
        self.events()
            .into_iter()
            .find(|e| e.level == level && e.message() == message)
    }
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        self.events
            .lock()
            .map(|mut events| {
                events.push(CapturedEvent {
                    level: *event.metadata().level(),
                    fields: visitor.fields,
                })
            })
            .ok();
    }
}

/// Run `f` with a capturing subscriber installed on this thread only.
fn capture<T>(f: impl FnOnce() -> T) -> (T, CaptureLayer) {
    let layer = CaptureLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, layer)
}

#[test]
fn test_handler_panic_logged_as_error() {
    let (_, logs) = capture(|| {
        let store = Store::new();
        store.subscribe("x", |_, _| panic!("bad handler")).unwrap();
        store.set("x", 1).unwrap();
    });

    let event = logs
        .find(Level::ERROR, "handler panicked")
        .expect("panic should be logged");
    assert!(event.fields["panic"].contains("bad handler"));
}

#[test]
fn test_failed_fetch_logged_as_warning() {
    let (_, logs) = capture(|| {
        let store = Store::new();
        let _ = block_on(store.set_async("user", |_| async { Err::<Value, _>("offline") }));
    });

    let event = logs
        .find(Level::WARN, "async operation failed")
        .expect("failure should be logged");
    assert_eq!(event.fields["path"], "user");
    assert!(event.fields["error"].contains("offline"));
}

#[test]
fn test_supersede_and_destroy_logged() {
    let (_, logs) = capture(|| {
        let store = Store::new();
        let (_tx1, rx1) = oneshot::channel::<Value>();
        let (_tx2, rx2) = oneshot::channel::<Value>();

        let _first = store.set_async("feed", move |_| async move { rx1.await.map_err(|e| e.to_string()) });
        let _second = store.set_async("feed", move |_| async move { rx2.await.map_err(|e| e.to_string()) });
        store.destroy();
    });

    let superseded = logs
        .find(Level::DEBUG, "async operation superseded")
        .expect("supersede should be logged");
    assert_eq!(superseded.fields["path"], "feed");
    assert_eq!(superseded.fields["superseded"], "1");
    assert_eq!(superseded.fields["by"], "2");
    let destroyed = logs
        .find(Level::DEBUG, "store destroyed")
        .expect("destroy should be logged");
    assert_eq!(destroyed.fields["cancelled"], "1");
}

#[test]
fn test_writes_traced() {
    let (_, logs) = capture(|| {
        let store = Store::with_initial(json!({"a": 0}));
        store.set("a", 1).unwrap();
        store
            .batch(|| {
                store.set("a", 2).unwrap();
            })
            .unwrap();
    });

    let writes: Vec<_> = logs
        .events()
        .into_iter()
        .filter(|e| e.level == Level::TRACE && e.message() == "write")
        .collect();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[1].fields.get("batched").map(String::as_str), Some("true"));
}
