//! Event and behavior notification.

use crate::record::Record;
use crate::value::Value;
use std::fmt;
use std::sync::RwLock;

/// Receives `"type:event"` notifications.
pub trait EventsManager: Send + Sync {
    /// Fire an event. Returning `false` stops the operation that fired it.
    fn fire(&self, event: &str, source: &str, record: Option<&Record>) -> bool;
}

/// Reusable model behavior attached through the relation manager.
pub trait Behavior: Send + Sync {
    /// Called for every model event. Returning `false` cancels the operation.
    fn notify(&self, event: &str, record: &mut Record) -> bool;

    /// Called for methods the model does not implement.
    fn missing_method(&self, _record: &mut Record, _method: &str, _args: &[Value]) -> Option<Value> {
        None
    }
}

type Listener = Box<dyn Fn(&str, &str, Option<&Record>) -> bool + Send + Sync>;

/// Events manager dispatching to closures attached per event type.
///
/// A listener attached to `"model"` receives every `"model:*"` event; a
/// listener attached to `"model:beforeUpdate"` receives only that event.
#[derive(Default)]
pub struct SimpleEventsManager {
    listeners: RwLock<Vec<(String, Listener)>>,
}

impl SimpleEventsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<F>(&self, event_type: impl Into<String>, listener: F)
    where
        F: Fn(&str, &str, Option<&Record>) -> bool + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((event_type.into(), Box::new(listener)));
    }

    pub fn detach_all(&self) {
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl fmt::Debug for SimpleEventsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .listeners
            .read()
            .map_or(0, |listeners| listeners.len());
        f.debug_struct("SimpleEventsManager")
            .field("listeners", &count)
            .finish()
    }
}

impl EventsManager for SimpleEventsManager {
    fn fire(&self, event: &str, source: &str, record: Option<&Record>) -> bool {
        let event_type = event.split(':').next().unwrap_or(event);
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        let mut status = true;
        for (attached, listener) in listeners.iter() {
            if attached == event || attached == event_type {
                tracing::trace!(event = %event, source = %source, "dispatching event");
                if !listener(event, source, record) {
                    status = false;
                }
            }
        }
        status
    }
}
