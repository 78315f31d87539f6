// Event Bus - fan-out of job/pipeline lifecycle events
//
// Listeners are pure observers: they are called synchronously on the
// emitting task and nothing they do feeds back into control flow.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::domain::JobEvent;

pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &JobEvent);
}

impl<F> EventListener for F
where
    F: Fn(&JobEvent) + Send + Sync,
{
    fn on_event(&self, event: &JobEvent) {
        self(event)
    }
}

#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.listeners.write().push(listener);
    }

    /// Deliver an event to every registered listener
    pub fn push(&self, event: JobEvent) {
        // snapshot so a listener may register another one without deadlocking
        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

/// Listener that keeps every event, for tests and diagnostics
#[derive(Default)]
pub struct RecordingListener {
    events: parking_lot::Mutex<Vec<JobEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<crate::domain::EventKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }
}

impl EventListener for RecordingListener {
    fn on_event(&self, event: &JobEvent) {
        self.events.lock().push(event.clone());
    }
}
