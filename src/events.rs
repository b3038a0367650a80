//! Publish/subscribe event bus connecting the game subsystems.
//!
//! Dispatch is fully synchronous and single-threaded: `publish` invokes every
//! subscriber for the type, in registration order, before it returns. A
//! subscriber may itself publish further events; those run to completion
//! inside the outer call. A failing subscriber never prevents the remaining
//! subscribers from running and never reaches the publisher.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

/// Event payload map.
pub type Payload = Map<String, Value>;

/// Closed set of event types routed by the bus. Arbitrary string types are
/// unrepresentable by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    BallHit,
    BallStopped,
    BallInHole,
    BallReset,
    HoleStarted,
    HoleCompleted,
    GameStarted,
    GameCompleted,
    HazardDetected,
    UiContinueRequested,
    UiContinueConfirmed,
    InputAim,
    ErrorOccurred,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::BallHit => "ball:hit",
            EventType::BallStopped => "ball:stopped",
            EventType::BallInHole => "ball:in_hole",
            EventType::BallReset => "ball:reset",
            EventType::HoleStarted => "hole:started",
            EventType::HoleCompleted => "hole:completed",
            EventType::GameStarted => "game:started",
            EventType::GameCompleted => "game:completed",
            EventType::HazardDetected => "hazard:detected",
            EventType::UiContinueRequested => "ui:continue_requested",
            EventType::UiContinueConfirmed => "ui:continue_confirmed",
            EventType::InputAim => "input:aim",
            EventType::ErrorOccurred => "error:occurred",
        }
    }

    /// Types whose handler failures are surfaced to the user instead of only
    /// being logged.
    pub fn is_critical(self) -> bool {
        matches!(
            self,
            EventType::BallHit
                | EventType::HoleCompleted
                | EventType::GameCompleted
                | EventType::GameStarted
                | EventType::HazardDetected
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published event. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub data: Payload,
    pub source: Option<String>,
    /// Frame-clock time of publication, in seconds.
    pub timestamp: f64,
}

/// Convert a `json!({..})` object literal into an event payload. Non-object
/// values yield an empty payload.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

pub type HandlerResult = anyhow::Result<()>;
type Callback = dyn FnMut(&Event) -> HandlerResult;

/// Handle returned by [`EventBus::subscribe`]; pass back to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId {
    event_type: EventType,
    id: u64,
}

struct SubEntry {
    id: u64,
    context: Option<String>,
    callback: Rc<RefCell<Callback>>,
}

pub struct EventBus {
    subscribers: RefCell<HashMap<EventType, Vec<Rc<SubEntry>>>>,
    history: RefCell<VecDeque<Event>>,
    history_cap: usize,
    enabled: Cell<bool>,
    now: Cell<f64>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new(history_cap: usize) -> Self {
        Self {
            subscribers: RefCell::new(HashMap::new()),
            history: RefCell::new(VecDeque::with_capacity(history_cap)),
            history_cap: history_cap.max(1),
            enabled: Cell::new(true),
            now: Cell::new(0.0),
            next_id: Cell::new(1),
        }
    }

    /// Stamp for subsequent publishes; the game updates this once per frame.
    pub fn set_now(&self, now: f64) {
        self.now.set(now);
    }

    /// Register a listener. `context` labels the owning subsystem in error
    /// logs (fallback: "unknown").
    pub fn subscribe<F>(&self, event_type: EventType, context: Option<&str>, callback: F) -> SubscriptionId
    where
        F: FnMut(&Event) -> HandlerResult + 'static,
    {
        self.register(event_type, context, Rc::new(RefCell::new(callback)))
    }

    /// Register one callback for several event types. The returned handles
    /// can be removed as a batch with [`EventBus::unsubscribe_all`].
    pub fn subscribe_many<F>(
        &self,
        event_types: &[EventType],
        context: Option<&str>,
        callback: F,
    ) -> Vec<SubscriptionId>
    where
        F: FnMut(&Event) -> HandlerResult + 'static,
    {
        let shared: Rc<RefCell<Callback>> = Rc::new(RefCell::new(callback));
        event_types
            .iter()
            .map(|&event_type| self.register(event_type, context, shared.clone()))
            .collect()
    }

    fn register(
        &self,
        event_type: EventType,
        context: Option<&str>,
        callback: Rc<RefCell<Callback>>,
    ) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers
            .borrow_mut()
            .entry(event_type)
            .or_default()
            .push(Rc::new(SubEntry {
                id,
                context: context.map(str::to_owned),
                callback,
            }));
        SubscriptionId { event_type, id }
    }

    /// Remove one listener. Stale or unknown ids are a no-op, not an error.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if let Some(list) = self.subscribers.borrow_mut().get_mut(&id.event_type) {
            list.retain(|entry| entry.id != id.id);
        }
    }

    pub fn unsubscribe_all(&self, ids: &[SubscriptionId]) {
        for &id in ids {
            self.unsubscribe(id);
        }
    }

    pub fn enable(&self) {
        self.enabled.set(true);
    }

    /// While disabled, `publish` is a complete no-op: no dispatch, no history.
    pub fn disable(&self) {
        self.enabled.set(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscribers
            .borrow()
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// Synchronously deliver an event to every current subscriber, then
    /// append it to the history ring.
    pub fn publish(&self, event_type: EventType, data: Payload, source: Option<&str>) {
        if !self.enabled.get() {
            return;
        }
        let event = Event {
            event_type,
            data,
            source: source.map(str::to_owned),
            timestamp: self.now.get(),
        };
        self.dispatch(&event);
        self.record(event);
    }

    fn dispatch(&self, event: &Event) {
        // Snapshot so subscribe/unsubscribe from inside a callback cannot
        // invalidate the iteration.
        let entries: Vec<Rc<SubEntry>> = self
            .subscribers
            .borrow()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        for entry in entries {
            let Ok(mut callback) = entry.callback.try_borrow_mut() else {
                // The callback is already running further up the stack: it
                // published an event it is itself subscribed to.
                tracing::warn!(
                    event = %event.event_type,
                    context = entry.context.as_deref().unwrap_or("unknown"),
                    "skipping re-entrant subscriber invocation"
                );
                continue;
            };
            let outcome = (*callback)(event);
            drop(callback);
            if let Err(error) = outcome {
                self.report_subscriber_failure(event, entry.context.as_deref(), &error);
            }
        }
    }

    fn report_subscriber_failure(&self, event: &Event, context: Option<&str>, error: &anyhow::Error) {
        let context = context.unwrap_or("unknown");
        let snapshot = simplify_payload(&event.data);
        let critical = event.event_type.is_critical();
        if critical {
            tracing::error!(
                source = "EventBus::publish",
                context,
                event = %event.event_type,
                payload = %snapshot,
                %error,
                "critical event subscriber failed"
            );
        } else {
            tracing::warn!(
                source = "EventBus::publish",
                context,
                event = %event.event_type,
                payload = %snapshot,
                %error,
                "event subscriber failed"
            );
        }
        // A failure while handling error:occurred is logged once and
        // swallowed, never re-published.
        if event.event_type == EventType::ErrorOccurred {
            return;
        }
        let data = payload(serde_json::json!({
            "eventType": event.event_type.as_str(),
            "message": error.to_string(),
            "critical": critical,
            "context": context,
            "payload": snapshot,
        }));
        let error_event = Event {
            event_type: EventType::ErrorOccurred,
            data,
            source: Some("EventBus::publish".to_owned()),
            timestamp: self.now.get(),
        };
        self.dispatch(&error_event);
        self.record(error_event);
    }

    fn record(&self, event: Event) {
        let mut history = self.history.borrow_mut();
        if history.len() == self.history_cap {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// The most recent `limit` events (default: all retained), oldest first.
    pub fn history(&self, limit: Option<usize>) -> Vec<Event> {
        let history = self.history.borrow();
        let take = limit.unwrap_or(history.len()).min(history.len());
        history.iter().skip(history.len() - take).cloned().collect()
    }

    /// Drop all subscriptions and history; used between game sessions.
    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
        self.history.borrow_mut().clear();
    }
}

/// Render a bounded single-line snapshot of a payload for log output.
/// Nested values never recurse: arrays and objects collapse to markers.
fn simplify_payload(data: &Payload) -> String {
    let fields: Vec<String> = data
        .iter()
        .map(|(key, value)| format!("{key}: {}", simplify_value(value)))
        .collect();
    format!("{{{}}}", fields.join(", "))
}

fn simplify_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{s}\""),
        Value::Array(items) => format!("Array({})", items.len()),
        Value::Object(_) => "Object".to_owned(),
    }
}
