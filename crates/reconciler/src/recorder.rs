//! Best-effort event recording against sources.

use std::fmt;
use std::sync::Mutex;

use nslabel_core::ObjectRef;

/// Severity of a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventLevel {
    Normal,
    Warning,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

/// Sink for human-facing events.
///
/// Implementations must not block and must swallow their own failures.
pub trait EventRecorder: Send + Sync {
    fn record(&self, object: &ObjectRef, level: EventLevel, reason: &str, message: &str);
}

/// Recorder that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl EventRecorder for NoopRecorder {
    fn record(&self, _object: &ObjectRef, _level: EventLevel, _reason: &str, _message: &str) {}
}

/// An event captured by [`CollectingRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: ObjectRef,
    pub level: EventLevel,
    pub reason: String,
    pub message: String,
}

/// In-memory recorder for testing.
#[derive(Debug, Default)]
pub struct CollectingRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl CollectingRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Reasons recorded so far, in order.
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

impl EventRecorder for CollectingRecorder {
    fn record(&self, object: &ObjectRef, level: EventLevel, reason: &str, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                object: object.clone(),
                level,
                reason: reason.to_string(),
                message: message.to_string(),
            });
        }
    }
}
